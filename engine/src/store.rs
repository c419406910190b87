use crate::adapter::{DocumentAdapter, Origin, SourceInfo};
use crate::error::{EditError, Result};
use crate::page::{PageId, PageSize, Rotation, HOST_SOURCE};
use crate::planner;
use rand::distr::Alphanumeric;
use rand::Rng;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// A document pages were taken from. The first one is the opened document,
/// the others were inserted into it.
#[derive(Debug, Clone, Serialize)]
pub struct SourceFile {
    id: String,
    origin: Origin,
    info: SourceInfo,
}

impl SourceFile {
    fn new(origin: Origin, info: SourceInfo) -> Self {
        // random string
        let id = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(7)
            .map(char::from)
            .collect();

        Self { id, origin, info }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    /// `None` for pages that were made up rather than read from a file.
    pub fn path(&self) -> Option<&Path> {
        self.origin.path()
    }

    pub fn page_count(&self) -> usize {
        self.info.page_count
    }
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct PageStore {
    sources: Vec<SourceFile>,
    pub(crate) order: Vec<PageId>,
    pub(crate) selection: BTreeSet<PageId>,
    pub(crate) rotations: BTreeMap<PageId, Rotation>,
    original: BTreeMap<PageId, Rotation>,
    #[serde(skip)]
    checked_out: bool,
}

impl PageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens `path` as the host document, replacing whatever was open.
    ///
    /// On failure the store is left empty.
    pub fn open<A: DocumentAdapter + ?Sized>(&mut self, adapter: &A, path: &Path) -> Result<usize> {
        self.ensure_editable()?;
        self.reset();

        let info = adapter.open(path).map_err(|e| match e {
            EditError::SourceUnreadable { .. } => e,
            other => EditError::unreadable(path, other),
        })?;

        Ok(self.install(path, info))
    }

    /// Makes `info` the host document. Used when the document was opened
    /// somewhere else, e.g. on a background worker.
    pub fn install(&mut self, path: &Path, info: SourceInfo) -> usize {
        self.reset();

        let source = self.register_source(Origin::File(path.to_path_buf()), info);
        let page_count = self.sources[source].page_count();
        self.order = (0..page_count).map(PageId::host).collect();

        log::info!("Opened {} with {} pages", path.display(), page_count);
        page_count
    }

    /// Registers a document pages can be inserted from and returns its
    /// provenance index. Original rotations are recorded for all its pages.
    pub(crate) fn register_source(&mut self, origin: Origin, info: SourceInfo) -> usize {
        let source = self.sources.len();
        for (page, rotation) in info.rotations.iter().enumerate() {
            self.original.insert(PageId::new(source, page), *rotation);
        }
        self.sources.push(SourceFile::new(origin, info));
        source
    }

    /// Forgets everything. Called after a successful save.
    pub fn reset(&mut self) {
        self.sources.clear();
        self.order.clear();
        self.selection.clear();
        self.rotations.clear();
        self.original.clear();
        self.checked_out = false;
    }

    pub fn is_open(&self) -> bool {
        !self.sources.is_empty()
    }

    pub fn host(&self) -> Option<&SourceFile> {
        self.sources.get(HOST_SOURCE)
    }

    pub fn sources(&self) -> &[SourceFile] {
        &self.sources
    }

    pub fn source(&self, source: usize) -> Option<&SourceFile> {
        self.sources.get(source)
    }

    pub fn origins(&self) -> Vec<Origin> {
        self.sources.iter().map(|s| s.origin.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn order(&self) -> &[PageId] {
        &self.order
    }

    pub fn selection(&self) -> &BTreeSet<PageId> {
        &self.selection
    }

    pub fn is_selected(&self, id: PageId) -> bool {
        self.selection.contains(&id)
    }

    pub fn contains(&self, id: PageId) -> bool {
        self.order.contains(&id)
    }

    pub fn position(&self, id: PageId) -> Option<usize> {
        self.order.iter().position(|p| *p == id)
    }

    pub fn page_at(&self, position: usize) -> Option<PageId> {
        self.order.get(position).copied()
    }

    /// Pending rotation relative to the page's original orientation.
    pub fn delta(&self, id: PageId) -> Rotation {
        self.rotations.get(&id).copied().unwrap_or_default()
    }

    pub fn original_rotation(&self, id: PageId) -> Rotation {
        self.original.get(&id).copied().unwrap_or_default()
    }

    /// Rotation the page will have once saved.
    pub fn effective_rotation(&self, id: PageId) -> Rotation {
        planner::effective_rotation(self.original_rotation(id), self.delta(id))
    }

    /// Media box of the page, A4 when its document didn't say.
    pub fn page_size(&self, id: PageId) -> PageSize {
        self.sources
            .get(id.source)
            .map(|source| source.info.size(id.page))
            .unwrap_or_default()
    }

    /// Marks the store as handed over to a save. Edits are refused until
    /// [`PageStore::check_in`] or [`PageStore::reset`].
    pub fn check_out(&mut self) -> Result<()> {
        self.ensure_editable()?;
        if !self.is_open() {
            return Err(EditError::NoDocument);
        }
        self.checked_out = true;
        Ok(())
    }

    pub fn check_in(&mut self) {
        self.checked_out = false;
    }

    pub fn is_checked_out(&self) -> bool {
        self.checked_out
    }

    pub(crate) fn ensure_editable(&self) -> Result<()> {
        if self.checked_out {
            return Err(EditError::SaveInFlight);
        }
        Ok(())
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        self.ensure_editable()?;
        if !self.is_open() {
            return Err(EditError::NoDocument);
        }
        Ok(())
    }

    pub(crate) fn ensure_known(&self, id: PageId) -> Result<()> {
        if !self.contains(id) {
            return Err(EditError::UnknownPage(id));
        }
        Ok(())
    }
}

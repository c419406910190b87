use crate::adapter::Origin;
use crate::error::{EditError, Result};
use crate::page::{PageId, Rotation};
use crate::store::PageStore;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanMode {
    /// Every page, in the current order.
    KeepAll,
    /// Every page except the selected ones.
    DeleteSelected,
    /// Only the selected pages, in the current order.
    KeepOnlySelected,
    /// The given pages, in the given order.
    ExplicitList(Vec<PageId>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlannedPage {
    pub id: PageId,
    /// Rotation stored in the page's source document.
    pub original: Rotation,
    /// Absolute rotation the page is saved with.
    pub rotation: Rotation,
}

impl PlannedPage {
    pub fn is_turned(&self) -> bool {
        self.rotation != self.original
    }
}

/// Everything a save needs, detached from the store it was computed from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SavePlan {
    /// Where each source's pages come from, indexed by page provenance.
    pub sources: Vec<Origin>,
    pub pages: Vec<PlannedPage>,
}

impl SavePlan {
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Whether a copy that keeps the stored rotation of each page still
    /// needs its rotations rewritten.
    pub fn needs_rotation_pass(&self) -> bool {
        self.pages.iter().any(PlannedPage::is_turned)
    }

    /// Absolute rotation for every output position.
    pub fn rotations(&self) -> BTreeMap<usize, Rotation> {
        self.pages
            .iter()
            .enumerate()
            .map(|(index, page)| (index, page.rotation))
            .collect()
    }
}

/// Rotation a page ends up with: what its document says, plus what the user
/// added.
pub fn effective_rotation(original: Rotation, delta: Rotation) -> Rotation {
    original.add(delta)
}

/// Computes the pages to write for `mode`.
///
/// Pages that are no longer part of the document are skipped and every page
/// appears at most once. Fails with [`EditError::EmptyResult`] when nothing
/// would be written.
pub fn plan(store: &PageStore, mode: &PlanMode) -> Result<SavePlan> {
    if !store.is_open() {
        return Err(EditError::NoDocument);
    }

    let ids: Vec<PageId> = match mode {
        PlanMode::KeepAll => store.order().to_vec(),
        PlanMode::DeleteSelected => store
            .order()
            .iter()
            .filter(|id| !store.is_selected(**id))
            .copied()
            .collect(),
        PlanMode::KeepOnlySelected => store
            .order()
            .iter()
            .filter(|id| store.is_selected(**id))
            .copied()
            .collect(),
        PlanMode::ExplicitList(ids) => ids
            .iter()
            .filter(|id| store.contains(**id))
            .copied()
            .collect(),
    };

    let mut seen = BTreeSet::new();
    let pages = ids
        .into_iter()
        .filter(|id| seen.insert(*id))
        .map(|id| PlannedPage {
            id,
            original: store.original_rotation(id),
            rotation: store.effective_rotation(id),
        })
        .collect::<Vec<_>>();

    if pages.is_empty() {
        return Err(EditError::EmptyResult);
    }

    log::debug!("Planned {} pages for {:?}", pages.len(), mode);
    Ok(SavePlan {
        sources: store.origins(),
        pages,
    })
}

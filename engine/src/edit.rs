use crate::adapter::{DocumentAdapter, Origin, SourceInfo};
use crate::error::{EditError, Result};
use crate::page::{PageId, Rotation};
use crate::store::PageStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
}

/// Page numbers as the user reads them: the first page is odd.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parity {
    Even,
    Odd,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Edit {
    Toggle { page: PageId },
    SelectAll,
    ClearSelection,
    InvertSelection,
    SelectParity { parity: Parity },
    MoveSelected { direction: Direction },
    MovePage { from: usize, to: usize },
    Permute { order: Vec<usize> },
    Rotate { pages: Vec<PageId>, degrees: i32 },
    RotateSelected { degrees: i32 },
    Insert {
        position: usize,
        source: PathBuf,
        #[serde(default)]
        pages: Option<Vec<usize>>,
    },
    InsertBlank { position: usize },
    Delete { pages: Vec<PageId> },
    DeleteSelected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
    Applied,
    /// A move was asked for but the selection already touches that end.
    AtBoundary,
    /// These pages look different now and need a new thumbnail.
    Rotated(Vec<PageId>),
    Inserted(Vec<PageId>),
    Deleted(usize),
    /// The edit was handed to the background worker.
    Pending,
}

impl PageStore {
    /// Applies one edit. `adapter` is only used to open documents for
    /// [`Edit::Insert`].
    pub fn apply<A: DocumentAdapter + ?Sized>(
        &mut self,
        adapter: &A,
        edit: &Edit,
    ) -> Result<EditOutcome> {
        log::debug!("Applying {:?}", edit);

        match edit {
            Edit::Toggle { page } => self.toggle_select(*page).map(|_| EditOutcome::Applied),
            Edit::SelectAll => self.select_all().map(|_| EditOutcome::Applied),
            Edit::ClearSelection => self.clear_selection().map(|_| EditOutcome::Applied),
            Edit::InvertSelection => self.invert_selection().map(|_| EditOutcome::Applied),
            Edit::SelectParity { parity } => {
                self.select_by_parity(*parity).map(|_| EditOutcome::Applied)
            }
            Edit::MoveSelected { direction } => self.move_selected(*direction),
            Edit::MovePage { from, to } => {
                self.move_page(*from, *to).map(|_| EditOutcome::Applied)
            }
            Edit::Permute { order } => self.permute(order).map(|_| EditOutcome::Applied),
            Edit::Rotate { pages, degrees } => {
                self.rotate(pages, *degrees).map(EditOutcome::Rotated)
            }
            Edit::RotateSelected { degrees } => {
                self.rotate_selected(*degrees).map(EditOutcome::Rotated)
            }
            Edit::Insert {
                position,
                source,
                pages,
            } => {
                self.ensure_open()?;
                self.check_position(*position)?;
                let info = adapter.open(source)?;
                self.insert_at(*position, source, info, pages.as_deref())
                    .map(EditOutcome::Inserted)
            }
            Edit::InsertBlank { position } => self
                .insert_blank(*position)
                .map(|id| EditOutcome::Inserted(vec![id])),
            Edit::Delete { pages } => self.mark_deleted(pages).map(EditOutcome::Deleted),
            Edit::DeleteSelected => self.delete_selected().map(EditOutcome::Deleted),
        }
    }

    /// Selects `id`, or deselects it when it already is.
    pub fn toggle_select(&mut self, id: PageId) -> Result<()> {
        self.ensure_open()?;
        self.ensure_known(id)?;

        if !self.selection.remove(&id) {
            self.selection.insert(id);
        }
        Ok(())
    }

    pub fn select_all(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.selection = self.order.iter().copied().collect();
        Ok(())
    }

    pub fn clear_selection(&mut self) -> Result<()> {
        self.ensure_editable()?;
        self.selection.clear();
        Ok(())
    }

    pub fn invert_selection(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.selection = self
            .order
            .iter()
            .filter(|id| !self.selection.contains(*id))
            .copied()
            .collect();
        Ok(())
    }

    /// Replaces the selection with the odd or even pages of the opened
    /// document, by their page number in that document. Inserted pages are
    /// never picked.
    pub fn select_by_parity(&mut self, parity: Parity) -> Result<()> {
        self.ensure_open()?;
        let wanted = match parity {
            Parity::Odd => 1,
            Parity::Even => 0,
        };
        self.selection = self
            .order
            .iter()
            .filter(|id| !id.is_inserted() && (id.page + 1) % 2 == wanted)
            .copied()
            .collect();
        Ok(())
    }

    /// Moves every selected page one position towards `direction`.
    ///
    /// Pages are swapped with their neighbour starting with the one closest to
    /// the destination, so a block of adjacent selected pages moves as a unit
    /// and keeps its internal order. Nothing moves when any selected page is
    /// already at that end of the document.
    pub fn move_selected(&mut self, direction: Direction) -> Result<EditOutcome> {
        self.ensure_open()?;
        if self.selection.is_empty() {
            return Err(EditError::NothingSelected);
        }

        let mut positions = self
            .order
            .iter()
            .enumerate()
            .filter(|(_, id)| self.selection.contains(*id))
            .map(|(position, _)| position)
            .collect::<Vec<_>>();

        let last = self.order.len() - 1;
        match direction {
            Direction::Up => {
                if positions.first() == Some(&0) {
                    return Ok(EditOutcome::AtBoundary);
                }
                for position in positions {
                    self.order.swap(position, position - 1);
                }
            }
            Direction::Down => {
                if positions.last() == Some(&last) {
                    return Ok(EditOutcome::AtBoundary);
                }
                positions.reverse();
                for position in positions {
                    self.order.swap(position, position + 1);
                }
            }
        }

        Ok(EditOutcome::Applied)
    }

    /// Moves the page at `from` so it ends up at `to`, shifting the pages in
    /// between. This is what a drag and drop resolves to.
    pub fn move_page(&mut self, from: usize, to: usize) -> Result<()> {
        self.ensure_open()?;
        let len = self.order.len();
        for position in [from, to] {
            if position >= len {
                return Err(EditError::InvalidPosition {
                    position,
                    len: len.saturating_sub(1),
                });
            }
        }

        let page = self.order.remove(from);
        self.order.insert(to, page);
        Ok(())
    }

    /// Rearranges pages so that the page now at `order[i]` ends up at `i`.
    pub fn permute(&mut self, order: &[usize]) -> Result<()> {
        self.ensure_open()?;

        let distinct = order.iter().collect::<BTreeSet<_>>();
        if order.len() != self.order.len()
            || distinct.len() != order.len()
            || order.iter().any(|position| *position >= self.order.len())
        {
            return Err(EditError::InvalidPermutation);
        }

        self.order = order.iter().map(|position| self.order[*position]).collect();
        Ok(())
    }

    /// Turns pages by a quarter turn, `degrees` being 90 or -90. Returns the
    /// pages whose preview is now stale.
    pub fn rotate(&mut self, ids: &[PageId], degrees: i32) -> Result<Vec<PageId>> {
        self.ensure_open()?;

        let step = match degrees {
            90 | -90 => Rotation::from_degrees(degrees as i64).unwrap_or_default(),
            other => return Err(EditError::InvalidRotation(other)),
        };
        for id in ids.iter() {
            self.ensure_known(*id)?;
        }

        let ids = ids.iter().copied().collect::<BTreeSet<_>>();
        for id in ids.iter() {
            let delta = self.delta(*id).add(step);
            if delta.is_upright() {
                self.rotations.remove(id);
            } else {
                self.rotations.insert(*id, delta);
            }
        }

        Ok(ids.into_iter().collect())
    }

    pub fn rotate_selected(&mut self, degrees: i32) -> Result<Vec<PageId>> {
        self.ensure_open()?;
        if self.selection.is_empty() {
            return Err(EditError::NothingSelected);
        }
        let ids = self.selection.iter().copied().collect::<Vec<_>>();
        self.rotate(&ids, degrees)
    }

    /// Inserts pages of another document at `position`. `pages` are 0-based
    /// indices in that document, all of them when `None`.
    ///
    /// The new identities carry the provenance of the inserted document, and
    /// their original rotation is the one stored in it.
    pub fn insert_at(
        &mut self,
        position: usize,
        path: &Path,
        info: SourceInfo,
        pages: Option<&[usize]>,
    ) -> Result<Vec<PageId>> {
        self.ensure_open()?;
        self.check_position(position)?;

        let pages = match pages {
            Some(pages) => pages.to_vec(),
            None => (0..info.page_count).collect(),
        };
        if pages.is_empty() {
            return Err(EditError::EmptyResult);
        }
        if let Some(page) = pages.iter().find(|page| **page >= info.page_count) {
            return Err(EditError::UnknownSourcePage {
                path: path.to_path_buf(),
                page: *page,
                page_count: info.page_count,
            });
        }

        let source = self.register_source(Origin::File(path.to_path_buf()), info);

        let mut inserted = Vec::with_capacity(pages.len());
        for page in pages.into_iter() {
            let id = PageId::new(source, page);
            // The same page picked twice is only inserted once.
            if !inserted.contains(&id) {
                inserted.push(id);
            }
        }

        self.order
            .splice(position..position, inserted.iter().copied());

        log::info!(
            "Inserted {} pages from {} at position {}",
            inserted.len(),
            path.display(),
            position
        );
        Ok(inserted)
    }

    /// Inserts an empty page at `position`, as large as the page before it
    /// (the one after it when inserting first).
    pub fn insert_blank(&mut self, position: usize) -> Result<PageId> {
        self.ensure_open()?;
        self.check_position(position)?;

        let neighbour = position
            .checked_sub(1)
            .and_then(|before| self.page_at(before))
            .or_else(|| self.page_at(position));
        let size = neighbour
            .map(|id| self.page_size(id))
            .unwrap_or_default();

        let info = SourceInfo::upright(1).with_sizes(vec![size]);
        let source = self.register_source(Origin::Blank(size), info);
        let id = PageId::new(source, 0);
        self.order.insert(position, id);

        log::info!(
            "Inserted a blank {}x{} page at position {}",
            size.width,
            size.height,
            position
        );
        Ok(id)
    }

    /// Removes pages from the document. Pages that are already gone are
    /// ignored. Returns how many pages were removed.
    pub fn mark_deleted(&mut self, ids: &[PageId]) -> Result<usize> {
        self.ensure_open()?;

        let ids = ids.iter().copied().collect::<BTreeSet<_>>();
        let before = self.order.len();
        self.order.retain(|id| !ids.contains(id));
        for id in ids.iter() {
            self.selection.remove(id);
            self.rotations.remove(id);
        }

        let removed = before - self.order.len();
        log::debug!("Deleted {} pages", removed);
        Ok(removed)
    }

    pub fn delete_selected(&mut self) -> Result<usize> {
        self.ensure_open()?;
        if self.selection.is_empty() {
            return Err(EditError::NothingSelected);
        }
        let ids = self.selection.iter().copied().collect::<Vec<_>>();
        self.mark_deleted(&ids)
    }

    pub(crate) fn check_position(&self, position: usize) -> Result<()> {
        if position > self.order.len() {
            return Err(EditError::InvalidPosition {
                position,
                len: self.order.len(),
            });
        }
        Ok(())
    }
}

use crate::adapter::DocumentAdapter;
use crate::error::{EditError, Result};
use crate::planner::{self, PlanMode, SavePlan};
use crate::store::PageStore;
use serde::Serialize;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SaveState {
    Idle,
    Planning,
    Materializing,
    Rotating,
    Finalizing,
    Failed,
}

impl Display for SaveState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SaveState::Idle => "idle",
            SaveState::Planning => "planning",
            SaveState::Materializing => "materializing",
            SaveState::Rotating => "rotating",
            SaveState::Finalizing => "finalizing",
            SaveState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaveReport {
    pub pages_written: usize,
    pub destination: PathBuf,
    /// Whether page rotations were rewritten in a separate pass.
    pub rotated: bool,
}

/// Writes a [`SavePlan`] through staged temporary files. Only the last one is
/// moved to the destination, so a failing save leaves neither a partial
/// destination nor temporary files behind.
pub struct SavePipeline<'a, A: DocumentAdapter + ?Sized> {
    adapter: &'a A,
    temp_dir: Option<PathBuf>,
    compress: bool,
    state: SaveState,
    transitions: Vec<SaveState>,
}

impl<'a, A: DocumentAdapter + ?Sized> SavePipeline<'a, A> {
    pub fn new(adapter: &'a A) -> Self {
        Self {
            adapter,
            temp_dir: None,
            compress: false,
            state: SaveState::Idle,
            transitions: Vec::new(),
        }
    }

    /// Stages temporary files in `dir` instead of the destination's directory.
    pub fn with_temp_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.temp_dir = dir;
        self
    }

    /// Compresses the result before moving it to the destination.
    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub fn state(&self) -> SaveState {
        self.state
    }

    /// Every state entered so far, in order.
    pub fn transitions(&self) -> &[SaveState] {
        &self.transitions
    }

    /// Plans `mode` against `store` and writes the result to `destination`.
    /// The store is reset once the document is saved, and left as is when
    /// anything fails.
    pub fn save(
        &mut self,
        store: &mut PageStore,
        mode: &PlanMode,
        destination: &Path,
    ) -> Result<SaveReport> {
        self.enter(SaveState::Planning);

        let plan = store
            .ensure_editable()
            .and_then(|_| planner::plan(&*store, mode))
            .map_err(|e| self.fail(e))?;

        let report = self.execute(&plan, destination)?;
        store.reset();
        Ok(report)
    }

    /// Writes an already computed plan. This doesn't need the store, so it
    /// can run away from it.
    pub fn execute(&mut self, plan: &SavePlan, destination: &Path) -> Result<SaveReport> {
        if plan.is_empty() {
            self.enter(SaveState::Planning);
            return Err(self.fail(EditError::EmptyResult));
        }

        self.write(plan, destination).map_err(|e| self.fail(e))
    }

    fn write(&mut self, plan: &SavePlan, destination: &Path) -> Result<SaveReport> {
        self.enter(SaveState::Materializing);
        let staged = self.stage(destination)?;
        self.adapter
            .write_subset(&plan.sources, &plan.pages, staged.path())?;

        let rotated = !self.adapter.copy_carries_rotation() && plan.needs_rotation_pass();
        let staged = if rotated {
            self.enter(SaveState::Rotating);
            let turned = self.stage(destination)?;
            self.adapter
                .apply_rotations(staged.path(), &plan.rotations(), turned.path())?;
            turned
        } else {
            staged
        };

        self.enter(SaveState::Finalizing);
        let staged = if self.compress {
            let compressed = self.stage(destination)?;
            self.adapter.compress(staged.path(), compressed.path())?;
            compressed
        } else {
            staged
        };
        finalize(staged, destination)?;

        self.enter(SaveState::Idle);
        log::info!(
            "Saved {} pages to {}",
            plan.len(),
            destination.display()
        );

        Ok(SaveReport {
            pages_written: plan.len(),
            destination: destination.to_path_buf(),
            rotated,
        })
    }

    fn stage(&self, destination: &Path) -> Result<NamedTempFile> {
        let dir = match (&self.temp_dir, destination.parent()) {
            (Some(dir), _) => dir.as_path(),
            (None, Some(dir)) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };

        tempfile::Builder::new()
            .prefix(".pagewright-")
            .suffix(".pdf")
            .tempfile_in(dir)
            .map_err(|e| EditError::write_failure(destination, e))
    }

    fn enter(&mut self, state: SaveState) {
        log::debug!("Save: {} -> {}", self.state, state);
        self.state = state;
        self.transitions.push(state);
    }

    fn fail(&mut self, error: EditError) -> EditError {
        log::error!("Save failed while {}: {}", self.state, error);
        self.enter(SaveState::Failed);
        self.enter(SaveState::Idle);
        error
    }
}

/// Moves the staged file to `destination`. When the two are on different
/// file systems the file is first copied next to the destination.
fn finalize(staged: NamedTempFile, destination: &Path) -> Result<()> {
    let staged = match staged.persist(destination) {
        Ok(_) => return Ok(()),
        Err(e) => {
            log::debug!("Couldn't move staged file: {}, copying it", e.error);
            e.file
        }
    };

    let dir = match destination.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let copy = tempfile::Builder::new()
        .prefix(".pagewright-")
        .suffix(".pdf")
        .tempfile_in(dir)
        .map_err(|e| EditError::write_failure(destination, e))?;

    fs::copy(staged.path(), copy.path()).map_err(|e| EditError::write_failure(destination, e))?;
    copy.persist(destination)
        .map_err(|e| EditError::write_failure(destination, e.error))?;
    Ok(())
}

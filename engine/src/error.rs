use crate::page::PageId;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EditError>;

#[derive(Debug, Error)]
pub enum EditError {
    #[error("Couldn't read {path}: {reason}")]
    SourceUnreadable { path: PathBuf, reason: String },

    #[error("Position {position} is outside of the document (0..={len})")]
    InvalidPosition { position: usize, len: usize },

    #[error("The result would not contain any page")]
    EmptyResult,

    #[error("Couldn't write {path}: {reason}")]
    AdapterWriteFailure { path: PathBuf, reason: String },

    #[error("Wrong password for {path}")]
    WrongPassword { path: PathBuf },

    #[error("A password is required")]
    EmptyPassword,

    #[error("Page {0} is not part of the document")]
    UnknownPage(PageId),

    #[error("Page {page} does not exist in {path} ({page_count} pages)")]
    UnknownSourcePage {
        path: PathBuf,
        page: usize,
        page_count: usize,
    },

    #[error("Pages can only be turned by 90 or -90 degrees, not {0}")]
    InvalidRotation(i32),

    #[error("The new order is not a permutation of the current pages")]
    InvalidPermutation,

    #[error("No page is selected")]
    NothingSelected,

    #[error("No document is open")]
    NoDocument,

    #[error("A save is in progress, edits are disabled until it completes")]
    SaveInFlight,

    #[error("Documents are still being opened")]
    Loading,

    #[error("Couldn't render page {page} of {path}: {reason}")]
    Render {
        path: PathBuf,
        page: usize,
        reason: String,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Background worker stopped: {0}")]
    Worker(String),
}

impl EditError {
    pub fn unreadable(path: &Path, reason: impl ToString) -> Self {
        EditError::SourceUnreadable {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    pub fn write_failure(path: &Path, reason: impl ToString) -> Self {
        EditError::AdapterWriteFailure {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_messages_are_readable() {
        let error = EditError::InvalidPosition {
            position: 7,
            len: 3,
        };
        assert_eq!(
            "Position 7 is outside of the document (0..=3)",
            error.to_string()
        );

        let error = EditError::unreadable(Path::new("missing.pdf"), "No such file");
        assert_eq!("Couldn't read missing.pdf: No such file", error.to_string());
    }
}

//! Page arrangement for PDF documents: reorder, rotate, insert and delete
//! pages, then save the result without ever leaving a half-written file.

pub mod adapter;
pub mod config;
pub mod edit;
pub mod error;
pub mod page;
pub mod planner;
pub mod save;
pub mod session;
pub mod store;

#[cfg(test)]
mod fixtures;

pub use adapter::{DocumentAdapter, ImageFormat, Metadata, Origin, PdfAdapter, SourceInfo, Thumbnail};
pub use config::Config;
pub use edit::{Direction, Edit, EditOutcome, Parity};
pub use error::{EditError, Result};
pub use page::{PageId, PageSize, Rotation};
pub use planner::{PlanMode, PlannedPage, SavePlan};
pub use save::{SavePipeline, SaveReport, SaveState};
pub use session::{Session, SessionEvent};
pub use store::PageStore;

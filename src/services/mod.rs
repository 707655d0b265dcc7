//! Reconciliation services.
//!
//! Each pass owns one entity store: citations, statistics, file usage and
//! versions. [`DocumentSession`] sequences them around the save cycle and
//! owns the guards that keep background pulls from clobbering edits.

mod citations;
mod files;
mod session;
mod statistics;
mod versions;

pub use citations::{markers_stale, CitationChange, CitationService, CitationSyncOutcome};
pub use files::FileUsageTracker;
pub use session::{
    DocumentSession, PassOutcome, PullOutcome, PullSkip, PullTrigger, SaveReport, SyncEvent,
    SyncTimings,
};
pub use statistics::{InsertOutcome, PullReport, PushReport, StatisticsReconciler};
pub use versions::VersionSnapshotter;

use crate::backend::BackendError;
use crate::editor::EditorError;

/// Errors from a reconciliation pass or the save cycle.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("editor error: {0}")]
    Editor(#[from] EditorError),
}

/// Errors surfaced by version operations.
#[derive(Debug, thiserror::Error)]
pub enum VersionError {
    #[error("failed to list versions: {0}")]
    List(#[source] BackendError),

    #[error("failed to create version: {0}")]
    Create(#[source] BackendError),

    #[error("failed to restore version: {0}")]
    Restore(#[source] BackendError),

    #[error("version {0} could not be restored")]
    Rejected(String),

    #[error("failed to apply restored content: {0}")]
    Editor(#[from] EditorError),
}

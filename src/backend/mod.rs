//! Backend contract for the document, citation, statistics, file and
//! version stores.
//!
//! Two implementations are provided:
//! - [`HttpBackend`]: the REST API
//! - [`MemoryBackend`]: an in-process store with the same semantics, used
//!   for offline runs and tests

mod http;
mod memory;

pub use http::HttpBackend;
pub use memory::{BackendCall, MemoryBackend};

use async_trait::async_trait;

use crate::models::{
    AutoVersionResult, Citation, Document, DocumentRef, DocumentUpdate, DocumentVersion,
    NewStatistic, NewVersion, ProjectFile, RestoreResult, Statistic, StatisticUpdate,
    StatisticsSyncRequest,
};

/// Result type for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// Errors from backend operations.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The entity no longer exists. Reconcilers treat this as a correction
    /// signal rather than a failure.
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Invalid request: {0}")]
    Invalid(String),
}

impl BackendError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, BackendError::NotFound(_))
    }
}

/// Operations consumed from the backend.
///
/// Implementations must be safe to share between the save path and the
/// background pull/version timers.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn get_document(&self, doc: &DocumentRef) -> BackendResult<Document>;

    async fn update_document(
        &self,
        doc: &DocumentRef,
        update: &DocumentUpdate,
    ) -> BackendResult<Document>;

    /// Create a citation. The server assigns its number and sub-number.
    async fn add_citation(&self, doc: &DocumentRef, article_id: &str) -> BackendResult<Citation>;

    async fn remove_citation(&self, doc: &DocumentRef, citation_id: &str) -> BackendResult<()>;

    async fn update_citation(
        &self,
        doc: &DocumentRef,
        citation_id: &str,
        note: Option<&str>,
    ) -> BackendResult<Citation>;

    /// Renumber citations from their document order. Returns the
    /// authoritative document, whose content may have been rewritten.
    async fn sync_citations(
        &self,
        doc: &DocumentRef,
        ordered_citation_ids: &[String],
    ) -> BackendResult<Document>;

    async fn get_statistic(&self, project_id: &str, statistic_id: &str)
        -> BackendResult<Statistic>;

    /// Full listing, used to detect deletions.
    async fn list_statistics(&self, project_id: &str) -> BackendResult<Vec<Statistic>>;

    async fn create_statistic(
        &self,
        project_id: &str,
        statistic: &NewStatistic,
    ) -> BackendResult<Statistic>;

    async fn update_statistic(
        &self,
        project_id: &str,
        statistic_id: &str,
        update: &StatisticUpdate,
    ) -> BackendResult<Statistic>;

    /// Replace the document's "used in" links with exactly the listed ids.
    async fn sync_statistics(
        &self,
        project_id: &str,
        request: &StatisticsSyncRequest,
    ) -> BackendResult<()>;

    async fn mark_statistic_used(
        &self,
        project_id: &str,
        statistic_id: &str,
        document_id: &str,
    ) -> BackendResult<()>;

    async fn list_files(&self, project_id: &str) -> BackendResult<Vec<ProjectFile>>;

    async fn file_download_url(&self, project_id: &str, file_id: &str) -> BackendResult<String>;

    async fn mark_file_used(
        &self,
        project_id: &str,
        file_id: &str,
        document_id: &str,
    ) -> BackendResult<()>;

    /// Replace the document's file usage links with exactly the listed ids.
    async fn sync_file_usage(&self, doc: &DocumentRef, file_ids: &[String]) -> BackendResult<()>;

    async fn list_versions(&self, doc: &DocumentRef) -> BackendResult<Vec<DocumentVersion>>;

    async fn create_version(
        &self,
        doc: &DocumentRef,
        version: &NewVersion,
    ) -> BackendResult<DocumentVersion>;

    async fn restore_version(
        &self,
        doc: &DocumentRef,
        version_id: &str,
    ) -> BackendResult<RestoreResult>;

    /// Let the server decide whether `content` differs enough from the last
    /// snapshot to warrant an auto version.
    async fn trigger_auto_version(
        &self,
        doc: &DocumentRef,
        content: &str,
    ) -> BackendResult<AutoVersionResult>;

    /// Fire-and-forget exit version. Delivery is not guaranteed and the
    /// outcome is never reported.
    fn send_exit_beacon(&self, doc: &DocumentRef, note: &str);
}

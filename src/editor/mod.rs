//! Editing surface contract.
//!
//! The rich-text editor itself is an external collaborator. The sync engine
//! only needs to read and replace the serialized HTML, insert elements at the
//! cursor, drop citation markers and ask the editor to renumber them.

mod memory;

use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;

pub use memory::MemoryEditor;

/// Editor error types.
#[derive(Debug, thiserror::Error)]
pub enum EditorError {
    #[error("editor I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("editor rejected content: {0}")]
    Rejected(String),

    #[error("citation renumbering did not settle within {0:?}")]
    SettleTimeout(Duration),
}

pub type EditorResult<T> = Result<T, EditorError>;

/// Resolves once the editor has finished renumbering citation markers.
pub type Settled = BoxFuture<'static, EditorResult<()>>;

#[async_trait]
pub trait Editor: Send + Sync {
    /// Current serialized content.
    async fn html(&self) -> String;

    /// Replace the whole content.
    async fn set_html(&self, html: &str) -> EditorResult<()>;

    /// Insert an element at the cursor.
    async fn insert_html(&self, html: &str) -> EditorResult<()>;

    /// Remove every marker referencing `citation_id`. Returns how many were
    /// removed.
    async fn remove_citation(&self, citation_id: &str) -> EditorResult<usize>;

    /// Start renumbering citation markers in document order.
    ///
    /// The editor applies numbering asynchronously; the returned future
    /// completes when the markers carry their final numbers.
    fn renumber_citations(&self) -> Settled;
}

/// Wait for a renumbering to settle, giving up after `timeout`.
///
/// A timeout is not fatal: callers proceed with whatever the editor holds
/// and the backend sync corrects the numbers.
pub async fn await_settled(settled: Settled, timeout: Duration) -> EditorResult<()> {
    match tokio::time::timeout(timeout, settled).await {
        Ok(result) => result,
        Err(_) => Err(EditorError::SettleTimeout(timeout)),
    }
}

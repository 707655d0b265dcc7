//! File usage tracking.

use std::sync::Arc;

use crate::backend::Backend;
use crate::content::{render_file, ContentScan};
use crate::editor::Editor;
use crate::models::{DocumentRef, ProjectFile};

use super::SyncError;

/// Keeps the "used in this document" links equal to the file ids present
/// in content.
pub struct FileUsageTracker {
    backend: Arc<dyn Backend>,
    doc: DocumentRef,
}

impl FileUsageTracker {
    pub fn new(backend: Arc<dyn Backend>, doc: DocumentRef) -> Self {
        Self { backend, doc }
    }

    /// Sync the links with exactly the file ids in `scan`. Returns how many
    /// ids were sent.
    pub async fn sync(&self, scan: &ContentScan) -> Result<usize, SyncError> {
        let file_ids = scan.file_ids();
        self.backend.sync_file_usage(&self.doc, &file_ids).await?;
        tracing::debug!("Synced {} file references for {}", file_ids.len(), self.doc);
        Ok(file_ids.len())
    }

    pub async fn list(&self) -> Result<Vec<ProjectFile>, SyncError> {
        Ok(self.backend.list_files(&self.doc.project_id).await?)
    }

    pub async fn download_url(&self, file_id: &str) -> Result<String, SyncError> {
        Ok(self
            .backend
            .file_download_url(&self.doc.project_id, file_id)
            .await?)
    }

    /// Insert a file reference at the editor cursor and mark the file used.
    pub async fn insert(&self, editor: &dyn Editor, file: &ProjectFile) -> Result<(), SyncError> {
        editor.insert_html(&render_file(file)).await?;
        if let Err(e) = self
            .backend
            .mark_file_used(&self.doc.project_id, &file.id, &self.doc.document_id)
            .await
        {
            tracing::warn!("Failed to mark file {} used: {}", file.id, e);
        }
        Ok(())
    }
}

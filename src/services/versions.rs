//! Version snapshots: manual, auto, exit and restore.

use std::sync::Arc;

use crate::backend::Backend;
use crate::models::{
    AutoVersionResult, DocumentRef, DocumentVersion, NewVersion, RestoreResult, VersionType,
};

use super::VersionError;

pub struct VersionSnapshotter {
    backend: Arc<dyn Backend>,
    doc: DocumentRef,
}

impl VersionSnapshotter {
    pub fn new(backend: Arc<dyn Backend>, doc: DocumentRef) -> Self {
        Self { backend, doc }
    }

    pub async fn list(&self) -> Result<Vec<DocumentVersion>, VersionError> {
        self.backend
            .list_versions(&self.doc)
            .await
            .map_err(VersionError::List)
    }

    /// Snapshot `title` and `content` as a manual version.
    pub async fn create_manual(
        &self,
        note: Option<&str>,
        title: &str,
        content: &str,
    ) -> Result<DocumentVersion, VersionError> {
        let note = note.map(str::trim).filter(|n| !n.is_empty());
        let version = NewVersion {
            version_type: VersionType::Manual,
            version_note: note.map(str::to_string),
            title: Some(title.to_string()),
            content: Some(content.to_string()),
        };
        let created = self
            .backend
            .create_version(&self.doc, &version)
            .await
            .map_err(VersionError::Create)?;
        tracing::info!(
            "Created version {} of {}",
            created.version_number,
            self.doc
        );
        Ok(created)
    }

    /// Restore a version, then record the replaced state as an auto version.
    ///
    /// Recording the replaced state is best-effort.
    pub async fn restore(
        &self,
        version_id: &str,
        previous_title: &str,
        previous_content: &str,
    ) -> Result<RestoreResult, VersionError> {
        let result = self
            .backend
            .restore_version(&self.doc, version_id)
            .await
            .map_err(VersionError::Restore)?;
        if !result.success {
            return Err(VersionError::Rejected(version_id.to_string()));
        }

        let before = NewVersion {
            version_type: VersionType::Auto,
            version_note: Some(format!("Before restoring version {}", version_id)),
            title: Some(previous_title.to_string()),
            content: Some(previous_content.to_string()),
        };
        if let Err(e) = self.backend.create_version(&self.doc, &before).await {
            tracing::warn!("Failed to record pre-restore state of {}: {}", self.doc, e);
        }
        Ok(result)
    }

    /// Ask the backend whether `content` warrants an auto version.
    /// Failures are logged and ignored.
    pub async fn auto(&self, content: &str) -> Option<AutoVersionResult> {
        match self.backend.trigger_auto_version(&self.doc, content).await {
            Ok(result) => {
                if result.created {
                    tracing::debug!(
                        "Auto version created for {} ({})",
                        self.doc,
                        result.reason.as_deref().unwrap_or("no reason given")
                    );
                }
                Some(result)
            }
            Err(e) => {
                tracing::debug!("Auto version failed for {}: {}", self.doc, e);
                None
            }
        }
    }

    /// Fire-and-forget exit snapshot.
    pub fn exit(&self) {
        self.backend
            .send_exit_beacon(&self.doc, "Auto-saved on exit");
    }
}

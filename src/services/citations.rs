//! Citation pass: change detection and the numbering-authority round trip.

use std::sync::Arc;

use crate::backend::{Backend, BackendError};
use crate::content::ContentScan;
use crate::models::{Citation, Document, DocumentRef};

use super::SyncError;

/// How the citations in content differ from the last synced ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CitationChange {
    None,
    /// A citation was added or removed.
    SetChanged,
    /// Same citations, different first-appearance order.
    OrderChanged,
}

impl CitationChange {
    pub fn detect(previous: &[String], current: &[String]) -> Self {
        if previous == current {
            return Self::None;
        }
        let mut a: Vec<&String> = previous.iter().collect();
        let mut b: Vec<&String> = current.iter().collect();
        a.sort();
        b.sort();
        if a == b {
            Self::OrderChanged
        } else {
            Self::SetChanged
        }
    }

    pub fn is_changed(self) -> bool {
        self != Self::None
    }
}

/// True when a marker shows a number that differs from the stored one.
///
/// Markers for citations the document does not know are ignored: the set
/// change that introduced them already triggered a sync, and the authority
/// drops unknown ids.
pub fn markers_stale(scan: &ContentScan, document: &Document) -> bool {
    scan.citation_meta().iter().any(|(id, meta)| {
        document.citation(id).is_some_and(|c| {
            meta.number != Some(c.inline_number) || meta.sub_number != c.sub_number
        })
    })
}

/// Result of a citation sync.
#[derive(Debug, Clone, PartialEq)]
pub enum CitationSyncOutcome {
    /// The authority renumbered and returned the document.
    Synced(Document),
    /// The sync failed; the document was re-fetched instead.
    Refetched(Document),
}

impl CitationSyncOutcome {
    pub fn document(&self) -> &Document {
        match self {
            Self::Synced(doc) | Self::Refetched(doc) => doc,
        }
    }

    pub fn into_document(self) -> Document {
        match self {
            Self::Synced(doc) | Self::Refetched(doc) => doc,
        }
    }
}

/// Citation CRUD and sync against the numbering authority.
pub struct CitationService {
    backend: Arc<dyn Backend>,
    doc: DocumentRef,
}

impl CitationService {
    pub fn new(backend: Arc<dyn Backend>, doc: DocumentRef) -> Self {
        Self { backend, doc }
    }

    /// Send the ordered citation ids to the authority.
    ///
    /// On failure the document is re-fetched so local state matches the
    /// server again. Only fails when both calls fail.
    pub async fn sync(&self, ordered_ids: &[String]) -> Result<CitationSyncOutcome, SyncError> {
        match self.backend.sync_citations(&self.doc, ordered_ids).await {
            Ok(doc) => {
                tracing::debug!(
                    "Synced {} citations for {}",
                    doc.citations.len(),
                    self.doc
                );
                Ok(CitationSyncOutcome::Synced(doc))
            }
            Err(e) => {
                tracing::warn!("Citation sync failed for {}: {}", self.doc, e);
                let doc = self.backend.get_document(&self.doc).await?;
                Ok(CitationSyncOutcome::Refetched(doc))
            }
        }
    }

    pub async fn create(&self, article_id: &str) -> Result<Citation, SyncError> {
        Ok(self.backend.add_citation(&self.doc, article_id).await?)
    }

    pub async fn update_note(
        &self,
        citation_id: &str,
        note: Option<&str>,
    ) -> Result<Citation, SyncError> {
        let note = note.map(str::trim).filter(|n| !n.is_empty());
        Ok(self
            .backend
            .update_citation(&self.doc, citation_id, note)
            .await?)
    }

    /// Delete a citation record. Already-deleted citations are not an error.
    pub async fn delete(&self, citation_id: &str) -> Result<(), SyncError> {
        match self.backend.remove_citation(&self.doc, citation_id).await {
            Ok(()) => Ok(()),
            Err(BackendError::NotFound(_)) => {
                tracing::debug!("Citation {} was already deleted", citation_id);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

//! In-memory backend for offline operation and tests.
//!
//! Implements the same semantics the API server has: it is the citation
//! numbering authority, keeps "used in document" links for statistics and
//! files, and stores an append-only version history. State is not persisted
//! across restarts.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use super::{Backend, BackendError, BackendResult};
use crate::content::numbering::{apply_numbers, assign_numbers};
use crate::models::{
    AutoVersionResult, Citation, Document, DocumentRef, DocumentUpdate, DocumentVersion,
    NewStatistic, NewVersion, ProjectFile, RestoreResult, Statistic, StatisticUpdate,
    StatisticsSyncRequest, TableData, VersionType,
};

/// Content length change that always warrants an auto version.
const AUTO_VERSION_MIN_CHANGE: usize = 200;

/// Age of the last snapshot, in seconds, after which any change warrants an
/// auto version.
const AUTO_VERSION_MAX_AGE_SECS: i64 = 300;

/// A recorded backend invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    GetDocument,
    UpdateDocument {
        title: Option<String>,
        content: Option<String>,
    },
    AddCitation {
        article_id: String,
    },
    RemoveCitation {
        citation_id: String,
    },
    UpdateCitation {
        citation_id: String,
    },
    SyncCitations {
        ordered: Vec<String>,
    },
    GetStatistic {
        statistic_id: String,
    },
    ListStatistics,
    CreateStatistic,
    UpdateStatistic {
        statistic_id: String,
        table_data: Option<TableData>,
    },
    SyncStatistics(StatisticsSyncRequest),
    MarkStatisticUsed {
        statistic_id: String,
    },
    ListFiles,
    FileDownloadUrl {
        file_id: String,
    },
    MarkFileUsed {
        file_id: String,
    },
    SyncFileUsage {
        file_ids: Vec<String>,
    },
    ListVersions,
    CreateVersion(NewVersion),
    RestoreVersion {
        version_id: String,
    },
    TriggerAutoVersion,
    ExitBeacon {
        note: String,
    },
}

impl BackendCall {
    /// Operation name, as accepted by [`MemoryBackend::fail`].
    pub fn name(&self) -> &'static str {
        match self {
            Self::GetDocument => "get_document",
            Self::UpdateDocument { .. } => "update_document",
            Self::AddCitation { .. } => "add_citation",
            Self::RemoveCitation { .. } => "remove_citation",
            Self::UpdateCitation { .. } => "update_citation",
            Self::SyncCitations { .. } => "sync_citations",
            Self::GetStatistic { .. } => "get_statistic",
            Self::ListStatistics => "list_statistics",
            Self::CreateStatistic => "create_statistic",
            Self::UpdateStatistic { .. } => "update_statistic",
            Self::SyncStatistics(_) => "sync_statistics",
            Self::MarkStatisticUsed { .. } => "mark_statistic_used",
            Self::ListFiles => "list_files",
            Self::FileDownloadUrl { .. } => "file_download_url",
            Self::MarkFileUsed { .. } => "mark_file_used",
            Self::SyncFileUsage { .. } => "sync_file_usage",
            Self::ListVersions => "list_versions",
            Self::CreateVersion(_) => "create_version",
            Self::RestoreVersion { .. } => "restore_version",
            Self::TriggerAutoVersion => "trigger_auto_version",
            Self::ExitBeacon { .. } => "exit_beacon",
        }
    }
}

#[derive(Debug)]
struct StoredVersion {
    version: DocumentVersion,
    title: String,
    content: String,
}

#[derive(Debug, Default)]
struct MemoryState {
    documents: HashMap<DocumentRef, Document>,
    statistics: HashMap<String, BTreeMap<String, Statistic>>,
    files: HashMap<String, Vec<ProjectFile>>,
    file_usage: HashMap<DocumentRef, BTreeSet<String>>,
    versions: HashMap<DocumentRef, Vec<StoredVersion>>,
    calls: Vec<BackendCall>,
    failing: HashSet<String>,
    latency: Duration,
}

/// In-memory backend.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record a call, apply injected latency and failures.
    async fn enter(&self, call: BackendCall) -> BackendResult<()> {
        let (latency, failing) = {
            let mut state = self.state();
            let failing = state.failing.contains(call.name());
            let name = call.name();
            state.calls.push(call);
            (state.latency, failing.then_some(name))
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        match failing {
            Some(name) => Err(BackendError::Connection(format!("injected failure: {}", name))),
            None => Ok(()),
        }
    }

    /// Make every call to `operation` fail until [`recover`](Self::recover).
    pub fn fail(&self, operation: &str) {
        self.state().failing.insert(operation.to_string());
    }

    pub fn recover(&self, operation: &str) {
        self.state().failing.remove(operation);
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.state().latency = latency;
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    pub fn insert_document(&self, doc: &DocumentRef, document: Document) {
        self.state().documents.insert(doc.clone(), document);
    }

    pub fn document(&self, doc: &DocumentRef) -> Option<Document> {
        self.state().documents.get(doc).cloned()
    }

    pub fn insert_statistic(&self, project_id: &str, statistic: Statistic) {
        self.state()
            .statistics
            .entry(project_id.to_string())
            .or_default()
            .insert(statistic.id.clone(), statistic);
    }

    /// Delete a statistic from outside the document, as a dashboard would.
    pub fn delete_statistic(&self, project_id: &str, statistic_id: &str) -> bool {
        self.state()
            .statistics
            .get_mut(project_id)
            .and_then(|stats| stats.remove(statistic_id))
            .is_some()
    }

    pub fn statistic(&self, project_id: &str, statistic_id: &str) -> Option<Statistic> {
        self.state()
            .statistics
            .get(project_id)
            .and_then(|stats| stats.get(statistic_id))
            .cloned()
    }

    pub fn insert_file(&self, project_id: &str, file: ProjectFile) {
        self.state()
            .files
            .entry(project_id.to_string())
            .or_default()
            .push(file);
    }

    pub fn file_usage(&self, doc: &DocumentRef) -> Vec<String> {
        self.state()
            .file_usage
            .get(doc)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn version_count(&self, doc: &DocumentRef) -> usize {
        self.state().versions.get(doc).map(Vec::len).unwrap_or(0)
    }

    fn store_version(
        state: &mut MemoryState,
        doc: &DocumentRef,
        version: &NewVersion,
    ) -> BackendResult<DocumentVersion> {
        let document = state
            .documents
            .get(doc)
            .ok_or_else(|| BackendError::NotFound(doc.to_string()))?;
        let title = version.title.clone().unwrap_or_else(|| document.title.clone());
        let content = version
            .content
            .clone()
            .unwrap_or_else(|| document.content.clone());

        let history = state.versions.entry(doc.clone()).or_default();
        let stored = DocumentVersion {
            id: uuid::Uuid::new_v4().to_string(),
            version_number: history.len() as u32 + 1,
            version_type: version.version_type,
            version_note: version.version_note.clone(),
            content_length: content.chars().count(),
            created_at: Utc::now(),
            created_by: "memory".to_string(),
        };
        history.push(StoredVersion {
            version: stored.clone(),
            title,
            content,
        });
        Ok(stored)
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn get_document(&self, doc: &DocumentRef) -> BackendResult<Document> {
        self.enter(BackendCall::GetDocument).await?;
        self.document(doc)
            .ok_or_else(|| BackendError::NotFound(doc.to_string()))
    }

    async fn update_document(
        &self,
        doc: &DocumentRef,
        update: &DocumentUpdate,
    ) -> BackendResult<Document> {
        self.enter(BackendCall::UpdateDocument {
            title: update.title.clone(),
            content: update.content.clone(),
        })
        .await?;

        let mut state = self.state();
        let document = state
            .documents
            .get_mut(doc)
            .ok_or_else(|| BackendError::NotFound(doc.to_string()))?;
        if let Some(title) = &update.title {
            document.title = title.clone();
        }
        if let Some(content) = &update.content {
            document.content = content.clone();
        }
        document.updated_at = Utc::now();
        Ok(document.clone())
    }

    async fn add_citation(&self, doc: &DocumentRef, article_id: &str) -> BackendResult<Citation> {
        self.enter(BackendCall::AddCitation {
            article_id: article_id.to_string(),
        })
        .await?;

        let mut state = self.state();
        let document = state
            .documents
            .get_mut(doc)
            .ok_or_else(|| BackendError::NotFound(doc.to_string()))?;

        let same_article = document
            .citations
            .iter()
            .filter(|c| c.article_id == article_id)
            .map(|c| (c.inline_number, c.sub_number))
            .max_by_key(|(_, sub)| *sub);
        let (inline_number, sub_number) = match same_article {
            Some((number, sub)) => (number, sub + 1),
            None => {
                let highest = document
                    .citations
                    .iter()
                    .map(|c| c.inline_number)
                    .max()
                    .unwrap_or(0);
                (highest + 1, 1)
            }
        };

        let citation = Citation {
            id: uuid::Uuid::new_v4().to_string(),
            article_id: article_id.to_string(),
            inline_number,
            sub_number,
            note: None,
            order_index: document.citations.len() as u32,
        };
        document.citations.push(citation.clone());
        Ok(citation)
    }

    async fn remove_citation(&self, doc: &DocumentRef, citation_id: &str) -> BackendResult<()> {
        self.enter(BackendCall::RemoveCitation {
            citation_id: citation_id.to_string(),
        })
        .await?;

        let mut state = self.state();
        let document = state
            .documents
            .get_mut(doc)
            .ok_or_else(|| BackendError::NotFound(doc.to_string()))?;
        let before = document.citations.len();
        document.citations.retain(|c| c.id != citation_id);
        if document.citations.len() == before {
            return Err(BackendError::NotFound(citation_id.to_string()));
        }
        Ok(())
    }

    async fn update_citation(
        &self,
        doc: &DocumentRef,
        citation_id: &str,
        note: Option<&str>,
    ) -> BackendResult<Citation> {
        self.enter(BackendCall::UpdateCitation {
            citation_id: citation_id.to_string(),
        })
        .await?;

        let mut state = self.state();
        let citation = state
            .documents
            .get_mut(doc)
            .and_then(|d| d.citations.iter_mut().find(|c| c.id == citation_id))
            .ok_or_else(|| BackendError::NotFound(citation_id.to_string()))?;
        citation.note = note.map(str::to_string);
        Ok(citation.clone())
    }

    async fn sync_citations(
        &self,
        doc: &DocumentRef,
        ordered_citation_ids: &[String],
    ) -> BackendResult<Document> {
        self.enter(BackendCall::SyncCitations {
            ordered: ordered_citation_ids.to_vec(),
        })
        .await?;

        let mut state = self.state();
        let document = state
            .documents
            .get_mut(doc)
            .ok_or_else(|| BackendError::NotFound(doc.to_string()))?;

        // Citations no longer referenced by the document are dropped.
        let mut by_id: HashMap<String, Citation> = document
            .citations
            .drain(..)
            .map(|c| (c.id.clone(), c))
            .collect();
        let mut kept: Vec<Citation> = ordered_citation_ids
            .iter()
            .filter_map(|id| by_id.remove(id))
            .collect();

        let assignments =
            assign_numbers(kept.iter().map(|c| (c.id.as_str(), c.article_id.as_str())));
        for (index, (citation, assigned)) in kept.iter_mut().zip(&assignments).enumerate() {
            citation.inline_number = assigned.inline_number;
            citation.sub_number = assigned.sub_number;
            citation.order_index = index as u32;
        }

        let numbers: HashMap<String, (u32, u32)> = kept
            .iter()
            .map(|c| (c.id.clone(), (c.inline_number, c.sub_number)))
            .collect();
        if let Some(content) = apply_numbers(&document.content, &numbers) {
            document.content = content;
        }
        document.citations = kept;
        document.updated_at = Utc::now();
        Ok(document.clone())
    }

    async fn get_statistic(
        &self,
        project_id: &str,
        statistic_id: &str,
    ) -> BackendResult<Statistic> {
        self.enter(BackendCall::GetStatistic {
            statistic_id: statistic_id.to_string(),
        })
        .await?;
        self.statistic(project_id, statistic_id)
            .ok_or_else(|| BackendError::NotFound(statistic_id.to_string()))
    }

    async fn list_statistics(&self, project_id: &str) -> BackendResult<Vec<Statistic>> {
        self.enter(BackendCall::ListStatistics).await?;
        Ok(self
            .state()
            .statistics
            .get(project_id)
            .map(|stats| stats.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn create_statistic(
        &self,
        project_id: &str,
        statistic: &NewStatistic,
    ) -> BackendResult<Statistic> {
        self.enter(BackendCall::CreateStatistic).await?;
        let created = Statistic {
            id: uuid::Uuid::new_v4().to_string(),
            title: statistic.title.clone(),
            kind: statistic.kind,
            config: statistic.config.clone(),
            table_data: statistic.table_data.clone(),
            used_in_documents: Vec::new(),
        };
        self.insert_statistic(project_id, created.clone());
        Ok(created)
    }

    async fn update_statistic(
        &self,
        project_id: &str,
        statistic_id: &str,
        update: &StatisticUpdate,
    ) -> BackendResult<Statistic> {
        self.enter(BackendCall::UpdateStatistic {
            statistic_id: statistic_id.to_string(),
            table_data: update.table_data.clone(),
        })
        .await?;

        let mut state = self.state();
        let statistic = state
            .statistics
            .get_mut(project_id)
            .and_then(|stats| stats.get_mut(statistic_id))
            .ok_or_else(|| BackendError::NotFound(statistic_id.to_string()))?;
        if let Some(title) = &update.title {
            statistic.title = title.clone();
        }
        if let Some(config) = &update.config {
            statistic.config = config.clone();
        }
        if let Some(table_data) = &update.table_data {
            statistic.table_data = table_data.clone();
        }
        Ok(statistic.clone())
    }

    async fn sync_statistics(
        &self,
        project_id: &str,
        request: &StatisticsSyncRequest,
    ) -> BackendResult<()> {
        self.enter(BackendCall::SyncStatistics(request.clone())).await?;

        let referenced: HashSet<&str> = request.ids().collect();
        let mut state = self.state();
        if let Some(stats) = state.statistics.get_mut(project_id) {
            for statistic in stats.values_mut() {
                let linked = statistic
                    .used_in_documents
                    .iter()
                    .any(|d| *d == request.document_id);
                if referenced.contains(statistic.id.as_str()) {
                    if !linked {
                        statistic.used_in_documents.push(request.document_id.clone());
                    }
                } else if linked {
                    statistic.used_in_documents.retain(|d| *d != request.document_id);
                }
            }
        }
        Ok(())
    }

    async fn mark_statistic_used(
        &self,
        project_id: &str,
        statistic_id: &str,
        document_id: &str,
    ) -> BackendResult<()> {
        self.enter(BackendCall::MarkStatisticUsed {
            statistic_id: statistic_id.to_string(),
        })
        .await?;

        let mut state = self.state();
        let statistic = state
            .statistics
            .get_mut(project_id)
            .and_then(|stats| stats.get_mut(statistic_id))
            .ok_or_else(|| BackendError::NotFound(statistic_id.to_string()))?;
        if !statistic.used_in_documents.iter().any(|d| d == document_id) {
            statistic.used_in_documents.push(document_id.to_string());
        }
        Ok(())
    }

    async fn list_files(&self, project_id: &str) -> BackendResult<Vec<ProjectFile>> {
        self.enter(BackendCall::ListFiles).await?;
        Ok(self
            .state()
            .files
            .get(project_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn file_download_url(&self, project_id: &str, file_id: &str) -> BackendResult<String> {
        self.enter(BackendCall::FileDownloadUrl {
            file_id: file_id.to_string(),
        })
        .await?;

        let exists = self
            .state()
            .files
            .get(project_id)
            .is_some_and(|files| files.iter().any(|f| f.id == file_id));
        if !exists {
            return Err(BackendError::NotFound(file_id.to_string()));
        }
        Ok(format!("memory://{}/files/{}", project_id, file_id))
    }

    async fn mark_file_used(
        &self,
        project_id: &str,
        file_id: &str,
        document_id: &str,
    ) -> BackendResult<()> {
        self.enter(BackendCall::MarkFileUsed {
            file_id: file_id.to_string(),
        })
        .await?;

        let doc = DocumentRef::new(project_id, document_id);
        self.state()
            .file_usage
            .entry(doc)
            .or_default()
            .insert(file_id.to_string());
        Ok(())
    }

    async fn sync_file_usage(&self, doc: &DocumentRef, file_ids: &[String]) -> BackendResult<()> {
        self.enter(BackendCall::SyncFileUsage {
            file_ids: file_ids.to_vec(),
        })
        .await?;
        self.state()
            .file_usage
            .insert(doc.clone(), file_ids.iter().cloned().collect());
        Ok(())
    }

    async fn list_versions(&self, doc: &DocumentRef) -> BackendResult<Vec<DocumentVersion>> {
        self.enter(BackendCall::ListVersions).await?;
        let state = self.state();
        let mut versions: Vec<DocumentVersion> = state
            .versions
            .get(doc)
            .map(|h| h.iter().map(|v| v.version.clone()).collect())
            .unwrap_or_default();
        versions.reverse();
        Ok(versions)
    }

    async fn create_version(
        &self,
        doc: &DocumentRef,
        version: &NewVersion,
    ) -> BackendResult<DocumentVersion> {
        self.enter(BackendCall::CreateVersion(version.clone())).await?;
        Self::store_version(&mut self.state(), doc, version)
    }

    async fn restore_version(
        &self,
        doc: &DocumentRef,
        version_id: &str,
    ) -> BackendResult<RestoreResult> {
        self.enter(BackendCall::RestoreVersion {
            version_id: version_id.to_string(),
        })
        .await?;

        let mut state = self.state();
        let (title, content) = state
            .versions
            .get(doc)
            .and_then(|h| h.iter().find(|v| v.version.id == version_id))
            .map(|v| (v.title.clone(), v.content.clone()))
            .ok_or_else(|| BackendError::NotFound(version_id.to_string()))?;
        let document = state
            .documents
            .get_mut(doc)
            .ok_or_else(|| BackendError::NotFound(doc.to_string()))?;
        document.title = title.clone();
        document.content = content.clone();
        document.updated_at = Utc::now();

        Ok(RestoreResult {
            success: true,
            restored_content: content,
            restored_title: title,
        })
    }

    async fn trigger_auto_version(
        &self,
        doc: &DocumentRef,
        content: &str,
    ) -> BackendResult<AutoVersionResult> {
        self.enter(BackendCall::TriggerAutoVersion).await?;

        let mut state = self.state();
        let reason = match state.versions.get(doc).and_then(|h| h.last()) {
            None => Some("first snapshot"),
            Some(last) if last.content == content => None,
            Some(last) if last.content.len().abs_diff(content.len()) >= AUTO_VERSION_MIN_CHANGE => {
                Some("significant change")
            }
            Some(last)
                if (Utc::now() - last.version.created_at).num_seconds() >= AUTO_VERSION_MAX_AGE_SECS =>
            {
                Some("interval elapsed")
            }
            Some(_) => None,
        };

        let Some(reason) = reason else {
            return Ok(AutoVersionResult {
                created: false,
                reason: Some("no significant change".to_string()),
            });
        };

        let version = NewVersion {
            version_type: VersionType::Auto,
            version_note: None,
            title: None,
            content: Some(content.to_string()),
        };
        Self::store_version(&mut state, doc, &version)?;
        Ok(AutoVersionResult {
            created: true,
            reason: Some(reason.to_string()),
        })
    }

    fn send_exit_beacon(&self, doc: &DocumentRef, note: &str) {
        let mut state = self.state();
        state.calls.push(BackendCall::ExitBeacon {
            note: note.to_string(),
        });
        if state.failing.contains("exit_beacon") {
            return;
        }
        let version = NewVersion::new(VersionType::Exit, Some(note.to_string()));
        let _ = Self::store_version(&mut state, doc, &version);
    }
}

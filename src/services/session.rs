//! Save orchestration for one open document.
//!
//! A [`DocumentSession`] owns the live content, the debounce timer and the
//! latches that keep the reconciliation passes from corrupting each other:
//!
//! - saves are serialized; each persists the raw content first, then runs
//!   the citation, statistics and file passes strictly in that order
//! - a pull is skipped while a save is in flight, while the editor holds
//!   unsaved content, within the grace window after the last edit, or while
//!   another pull is running
//! - corrections computed by a pass are written into the editor only if the
//!   editor still holds the content the pass looked at

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{mpsc, Notify};
use tokio::time::{Instant, MissedTickBehavior};

use crate::backend::Backend;
use crate::content::{render_citation, scan, ContentMetrics};
use crate::editor::{await_settled, Editor};
use crate::models::{
    Citation, Document, DocumentRef, DocumentUpdate, DocumentVersion, ProjectFile, RestoreResult,
};

use super::citations::{markers_stale, CitationChange, CitationService, CitationSyncOutcome};
use super::files::FileUsageTracker;
use super::statistics::{InsertOutcome, PullReport, StatisticsReconciler};
use super::versions::VersionSnapshotter;
use super::{SyncError, VersionError};

/// Timing policy of the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncTimings {
    /// Quiet period after the last edit before a save starts.
    pub save_debounce: Duration,
    /// Pulls are skipped this long after the last edit.
    pub edit_grace: Duration,
    pub pull_interval: Duration,
    pub auto_version_interval: Duration,
    /// Upper bound on waiting for the editor to renumber citations.
    pub renumber_settle_timeout: Duration,
}

impl Default for SyncTimings {
    fn default() -> Self {
        Self {
            save_debounce: Duration::from_millis(2000),
            edit_grace: Duration::from_millis(2500),
            pull_interval: Duration::from_secs(30),
            auto_version_interval: Duration::from_secs(300),
            renumber_settle_timeout: Duration::from_millis(2000),
        }
    }
}

/// What started a pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullTrigger {
    Load,
    Focus,
    Interval,
}

/// Why a pull did not run (or did not apply its result).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullSkip {
    /// The load-time pull already ran for this session.
    AlreadySynced,
    InFlight,
    SaveInFlight,
    /// The editor holds content that has not been persisted.
    PendingEdits,
    /// The user edited within the grace window.
    RecentEdit,
    /// The editor content changed while the store was being queried.
    ContentChanged,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PullOutcome {
    Skipped(PullSkip),
    Clean,
    /// Elements were removed or rebuilt and the result saved.
    Corrected(PullReport),
    Failed(String),
}

/// Result of one reconciliation pass within a save.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PassOutcome {
    #[default]
    Skipped,
    Clean,
    Corrected,
    Failed(String),
}

impl PassOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveReport {
    pub citations: PassOutcome,
    pub statistics: PassOutcome,
    pub files: PassOutcome,
    /// The editor content was replaced with corrected content.
    pub content_corrected: bool,
}

/// Events emitted for status indicators.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    Saved { content_length: usize },
    SaveFailed { error: String },
    BibliographyUpdating(bool),
    ContentCorrected,
    PassFailed { pass: &'static str, error: String },
    StatisticsPulled { removed: usize, rebuilt: usize },
    MetricsChanged(ContentMetrics),
}

struct SessionState {
    /// Last document returned by the backend.
    document: Document,
    title: String,
    persisted_title: String,
    live_content: String,
    persisted_content: String,
    /// Citation order the authority last numbered.
    synced_citations: Vec<String>,
    metrics: ContentMetrics,
    last_edit: Option<Instant>,
    save_due: Option<Instant>,
}

impl SessionState {
    fn set_content(&mut self, content: String) {
        self.metrics = ContentMetrics::from_html(&content);
        self.live_content = content;
    }

    fn is_dirty(&self) -> bool {
        self.live_content != self.persisted_content || self.title != self.persisted_title
    }
}

/// Clears its flag on drop.
struct Latch<'a>(&'a AtomicBool);

impl<'a> Latch<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }

    fn hold(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for Latch<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Raises the bibliography indicator for its lifetime.
struct BibliographyUpdate<'a> {
    session: &'a DocumentSession,
    _latch: Latch<'a>,
}

impl<'a> BibliographyUpdate<'a> {
    fn start(session: &'a DocumentSession) -> Self {
        let latch = Latch::hold(&session.bibliography_updating);
        session.emit(SyncEvent::BibliographyUpdating(true));
        Self {
            session,
            _latch: latch,
        }
    }
}

impl Drop for BibliographyUpdate<'_> {
    fn drop(&mut self) {
        self.session.emit(SyncEvent::BibliographyUpdating(false));
    }
}

/// One open document.
pub struct DocumentSession {
    doc: DocumentRef,
    backend: Arc<dyn Backend>,
    editor: Arc<dyn Editor>,
    timings: SyncTimings,
    citations: CitationService,
    statistics: StatisticsReconciler,
    files: FileUsageTracker,
    versions: VersionSnapshotter,
    state: Mutex<SessionState>,
    save_cycle: tokio::sync::Mutex<()>,
    save_in_flight: AtomicBool,
    pull_in_flight: AtomicBool,
    has_synced: AtomicBool,
    bibliography_updating: AtomicBool,
    edited: Notify,
    events: Option<mpsc::Sender<SyncEvent>>,
}

impl DocumentSession {
    /// Load the document and put its content into the editor.
    pub async fn open(
        backend: Arc<dyn Backend>,
        editor: Arc<dyn Editor>,
        doc: DocumentRef,
        timings: SyncTimings,
    ) -> Result<Self, SyncError> {
        let document = backend.get_document(&doc).await?;
        editor.set_html(&document.content).await?;

        let mut ordered: Vec<&Citation> = document.citations.iter().collect();
        ordered.sort_by_key(|c| c.order_index);
        let synced_citations = ordered.into_iter().map(|c| c.id.clone()).collect();

        let state = SessionState {
            title: document.title.clone(),
            persisted_title: document.title.clone(),
            live_content: document.content.clone(),
            persisted_content: document.content.clone(),
            metrics: ContentMetrics::from_html(&document.content),
            synced_citations,
            document,
            last_edit: None,
            save_due: None,
        };
        tracing::debug!("Opened {}", doc);

        Ok(Self {
            citations: CitationService::new(backend.clone(), doc.clone()),
            statistics: StatisticsReconciler::new(backend.clone(), doc.clone()),
            files: FileUsageTracker::new(backend.clone(), doc.clone()),
            versions: VersionSnapshotter::new(backend.clone(), doc.clone()),
            doc,
            backend,
            editor,
            timings,
            state: Mutex::new(state),
            save_cycle: tokio::sync::Mutex::new(()),
            save_in_flight: AtomicBool::new(false),
            pull_in_flight: AtomicBool::new(false),
            has_synced: AtomicBool::new(false),
            bibliography_updating: AtomicBool::new(false),
            edited: Notify::new(),
            events: None,
        })
    }

    /// Send status events to `tx`. Events are dropped when the channel is
    /// full.
    pub fn with_events(mut self, tx: mpsc::Sender<SyncEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: SyncEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.try_send(event);
        }
    }

    pub fn doc(&self) -> &DocumentRef {
        &self.doc
    }

    pub fn timings(&self) -> SyncTimings {
        self.timings
    }

    /// Last document returned by the backend.
    pub fn document(&self) -> Document {
        self.state().document.clone()
    }

    pub fn title(&self) -> String {
        self.state().title.clone()
    }

    pub fn live_content(&self) -> String {
        self.state().live_content.clone()
    }

    pub fn persisted_content(&self) -> String {
        self.state().persisted_content.clone()
    }

    pub fn metrics(&self) -> ContentMetrics {
        self.state().metrics
    }

    pub fn is_dirty(&self) -> bool {
        self.state().is_dirty()
    }

    pub fn is_bibliography_updating(&self) -> bool {
        self.bibliography_updating.load(Ordering::Acquire)
    }

    pub fn has_synced(&self) -> bool {
        self.has_synced.load(Ordering::Acquire)
    }

    /// Record a user edit: read the editor, recompute metrics and restart
    /// the debounce timer.
    pub async fn content_changed(&self) {
        let html = self.editor.html().await;
        let metrics = {
            let mut state = self.state();
            if state.live_content == html {
                return;
            }
            state.set_content(html);
            let now = Instant::now();
            state.last_edit = Some(now);
            state.save_due = Some(now + self.timings.save_debounce);
            state.metrics
        };
        self.emit(SyncEvent::MetricsChanged(metrics));
        self.edited.notify_one();
    }

    pub fn set_title(&self, title: impl Into<String>) {
        {
            let mut state = self.state();
            state.title = title.into();
            let now = Instant::now();
            state.last_edit = Some(now);
            state.save_due = Some(now + self.timings.save_debounce);
        }
        self.edited.notify_one();
    }

    /// Run one save cycle: persist the editor content, then the citation,
    /// statistics and file passes.
    ///
    /// Fails only when persisting fails; the content stays in the editor and
    /// the save is retried after the debounce period. Pass failures are
    /// reported in the [`SaveReport`].
    pub async fn save_now(&self) -> Result<SaveReport, SyncError> {
        let _cycle = self.save_cycle.lock().await;
        let _flight = Latch::hold(&self.save_in_flight);

        let content = self.editor.html().await;
        let (title, title_changed) = {
            let mut state = self.state();
            state.set_content(content.clone());
            (state.title.clone(), state.title != state.persisted_title)
        };

        let update = DocumentUpdate {
            title: title_changed.then(|| title.clone()),
            content: Some(content.clone()),
        };
        let saved = match self.backend.update_document(&self.doc, &update).await {
            Ok(saved) => saved,
            Err(e) => {
                tracing::error!("Failed to save {}: {}", self.doc, e);
                self.state().save_due = Some(Instant::now() + self.timings.save_debounce);
                self.emit(SyncEvent::SaveFailed {
                    error: e.to_string(),
                });
                return Err(e.into());
            }
        };
        {
            let mut state = self.state();
            state.persisted_content = content.clone();
            state.persisted_title = title;
            state.document = saved;
            if state.live_content == content {
                state.save_due = None;
            }
        }
        self.emit(SyncEvent::Saved {
            content_length: content.len(),
        });

        self.reconcile(content).await
    }

    /// Run the citation, statistics and file passes against `content`, which
    /// the backend already holds. Callers hold the save cycle.
    async fn reconcile(&self, content: String) -> Result<SaveReport, SyncError> {
        let mut report = SaveReport::default();
        let mut current = content.clone();

        report.citations = self.citation_pass(&mut current).await;

        let references = scan(&current);
        report.statistics = match self.statistics.push(&references).await {
            Ok(push) if push.failed.is_empty() => PassOutcome::Clean,
            Ok(push) => PassOutcome::Failed(format!(
                "{} statistics could not be updated",
                push.failed.len()
            )),
            Err(e) => PassOutcome::Failed(e.to_string()),
        };
        report.files = match self.files.sync(&references).await {
            Ok(_) => PassOutcome::Clean,
            Err(e) => PassOutcome::Failed(e.to_string()),
        };

        for (pass, outcome) in [("statistics", &report.statistics), ("files", &report.files)] {
            if let PassOutcome::Failed(error) = outcome {
                tracing::warn!("{} sync failed for {}: {}", pass, self.doc, error);
                self.emit(SyncEvent::PassFailed {
                    pass,
                    error: error.clone(),
                });
            }
        }

        if current != content {
            report.content_corrected = self.apply_correction(&content, current).await?;
        }
        Ok(report)
    }

    /// Sync citations when their set or order changed, or when markers show
    /// numbers the authority did not assign. Updates `current` with the
    /// renumbered content.
    async fn citation_pass(&self, current: &mut String) -> PassOutcome {
        let references = scan(current);
        let ordered = references.ordered_citation_ids();
        let (change, stale) = {
            let state = self.state();
            (
                CitationChange::detect(&state.synced_citations, &ordered),
                markers_stale(&references, &state.document),
            )
        };
        if !change.is_changed() && !stale {
            return PassOutcome::Skipped;
        }
        tracing::debug!(
            "Citations of {} need sync ({:?}, stale markers: {})",
            self.doc,
            change,
            stale
        );

        let _indicator = BibliographyUpdate::start(self);
        match self.citations.sync(&ordered).await {
            Ok(CitationSyncOutcome::Synced(document)) => {
                let renumbered = document.content != *current;
                if renumbered {
                    *current = document.content.clone();
                }
                let mut state = self.state();
                state.synced_citations = ordered;
                state.document = document;
                if renumbered {
                    PassOutcome::Corrected
                } else {
                    PassOutcome::Clean
                }
            }
            Ok(outcome @ CitationSyncOutcome::Refetched(_)) => {
                self.state().document = outcome.into_document();
                self.emit(SyncEvent::PassFailed {
                    pass: "citations",
                    error: "citation sync failed; document re-fetched".to_string(),
                });
                PassOutcome::Failed("citation sync failed; document re-fetched".to_string())
            }
            Err(e) => {
                tracing::warn!("Citation sync and re-fetch failed for {}: {}", self.doc, e);
                self.emit(SyncEvent::PassFailed {
                    pass: "citations",
                    error: e.to_string(),
                });
                PassOutcome::Failed(e.to_string())
            }
        }
    }

    /// Replace the editor content with `corrected` if it still holds
    /// `saved`, persisting it when the backend does not already hold it.
    async fn apply_correction(&self, saved: &str, corrected: String) -> Result<bool, SyncError> {
        if self.editor.html().await != saved {
            tracing::debug!(
                "Editor of {} changed during sync; correction left to the next save",
                self.doc
            );
            return Ok(false);
        }

        self.editor.set_html(&corrected).await?;
        let backend_has_it = {
            let mut state = self.state();
            state.set_content(corrected.clone());
            state.document.content == corrected
        };

        if !backend_has_it {
            let document = self
                .backend
                .update_document(&self.doc, &DocumentUpdate::content(corrected.clone()))
                .await?;
            self.state().document = document;
        }
        self.state().persisted_content = corrected;

        tracing::info!("Applied corrected content to {}", self.doc);
        self.emit(SyncEvent::ContentCorrected);
        Ok(true)
    }

    async fn pull_blocker(&self) -> Option<PullSkip> {
        if self.save_in_flight.load(Ordering::Acquire) {
            return Some(PullSkip::SaveInFlight);
        }
        let html = self.editor.html().await;
        let state = self.state();
        if html != state.persisted_content || state.title != state.persisted_title {
            return Some(PullSkip::PendingEdits);
        }
        if state
            .last_edit
            .is_some_and(|t| t.elapsed() < self.timings.edit_grace)
        {
            return Some(PullSkip::RecentEdit);
        }
        None
    }

    /// Bring store-side statistics changes into the document.
    pub async fn pull_sync(&self, trigger: PullTrigger) -> PullOutcome {
        if trigger == PullTrigger::Load && self.has_synced() {
            return PullOutcome::Skipped(PullSkip::AlreadySynced);
        }
        if let Some(reason) = self.pull_blocker().await {
            tracing::debug!("Skipping {:?} pull of {}: {:?}", trigger, self.doc, reason);
            return PullOutcome::Skipped(reason);
        }
        let Some(_latch) = Latch::try_acquire(&self.pull_in_flight) else {
            return PullOutcome::Skipped(PullSkip::InFlight);
        };

        let html = self.editor.html().await;
        let report = match self.statistics.pull(&html).await {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!("Statistics pull failed for {}: {}", self.doc, e);
                return PullOutcome::Failed(e.to_string());
            }
        };
        self.has_synced.store(true, Ordering::Release);

        let Some(corrected) = report.content.clone() else {
            return PullOutcome::Clean;
        };

        // The user may have typed, saved or restored while the store was
        // being queried.
        if let Some(reason) = self.pull_blocker().await {
            tracing::debug!("Discarding pull result for {}: {:?}", self.doc, reason);
            return PullOutcome::Skipped(reason);
        }
        if self.editor.html().await != html {
            tracing::debug!(
                "Discarding pull result for {}: content changed during the pull",
                self.doc
            );
            return PullOutcome::Skipped(PullSkip::ContentChanged);
        }

        if let Err(e) = self.editor.set_html(&corrected).await {
            return PullOutcome::Failed(e.to_string());
        }
        self.state().set_content(corrected);
        self.emit(SyncEvent::StatisticsPulled {
            removed: report.removed_tables.len() + report.removed_charts.len(),
            rebuilt: report.rebuilt_tables.len(),
        });

        match self.save_now().await {
            Ok(_) => PullOutcome::Corrected(report),
            Err(e) => PullOutcome::Failed(e.to_string()),
        }
    }

    pub async fn on_load(&self) -> PullOutcome {
        self.pull_sync(PullTrigger::Load).await
    }

    pub async fn on_focus(&self) -> PullOutcome {
        self.pull_sync(PullTrigger::Focus).await
    }

    /// Drive debounced saves, periodic pulls and auto versions until
    /// `shutdown` resolves, then flush and send the exit snapshot.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let start = Instant::now();
        let mut pull = tokio::time::interval_at(
            start + self.timings.pull_interval,
            self.timings.pull_interval,
        );
        pull.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut auto_version = tokio::time::interval_at(
            start + self.timings.auto_version_interval,
            self.timings.auto_version_interval,
        );
        auto_version.set_missed_tick_behavior(MissedTickBehavior::Delay);

        self.on_load().await;

        loop {
            let save_due = self.state().save_due;
            let save_timer = tokio::time::sleep_until(save_due.unwrap_or(start));

            tokio::select! {
                _ = &mut shutdown => break,
                _ = self.edited.notified() => {}
                _ = save_timer, if save_due.is_some() => {
                    if self.is_dirty() {
                        // Failures re-arm the timer.
                        let _ = self.save_now().await;
                    } else {
                        self.state().save_due = None;
                    }
                }
                _ = pull.tick() => {
                    self.pull_sync(PullTrigger::Interval).await;
                }
                _ = auto_version.tick() => {
                    let content = self.live_content();
                    self.versions.auto(&content).await;
                }
            }
        }

        if self.is_dirty() {
            if let Err(e) = self.save_now().await {
                tracing::warn!("Final save of {} failed: {}", self.doc, e);
            }
        }
        self.versions.exit();
    }

    async fn settle_renumbering(&self) {
        let settled = self.editor.renumber_citations();
        if let Err(e) = await_settled(settled, self.timings.renumber_settle_timeout).await {
            tracing::warn!("Renumbering in {} did not complete: {}", self.doc, e);
        }
    }

    /// Create a citation, insert it at the cursor and sync once the editor
    /// has renumbered.
    pub async fn add_citation(&self, article_id: &str) -> Result<Citation, SyncError> {
        let citation = self.citations.create(article_id).await?;
        self.editor.insert_html(&render_citation(&citation)).await?;
        self.settle_renumbering().await;
        self.save_now().await?;
        Ok(citation)
    }

    /// Remove a citation's markers from content. The record is dropped by
    /// the following sync.
    pub async fn remove_citation(&self, citation_id: &str) -> Result<SaveReport, SyncError> {
        let removed = self.editor.remove_citation(citation_id).await?;
        tracing::debug!("Removed {} markers of citation {}", removed, citation_id);
        self.settle_renumbering().await;
        self.save_now().await
    }

    /// Delete a citation record and every marker referencing it.
    pub async fn delete_citation(&self, citation_id: &str) -> Result<SaveReport, SyncError> {
        self.editor.remove_citation(citation_id).await?;
        self.content_changed().await;
        self.citations.delete(citation_id).await?;
        self.settle_renumbering().await;
        self.save_now().await
    }

    pub async fn update_citation_note(
        &self,
        citation_id: &str,
        note: Option<&str>,
    ) -> Result<Citation, SyncError> {
        let updated = self.citations.update_note(citation_id, note).await?;
        let mut state = self.state();
        if let Some(cached) = state
            .document
            .citations
            .iter_mut()
            .find(|c| c.id == updated.id)
        {
            *cached = updated.clone();
        }
        Ok(updated)
    }

    pub async fn insert_statistic(&self, statistic_id: &str) -> Result<InsertOutcome, SyncError> {
        let outcome = self
            .statistics
            .insert(self.editor.as_ref(), statistic_id)
            .await?;
        if matches!(outcome, InsertOutcome::Inserted(_)) {
            self.content_changed().await;
        }
        Ok(outcome)
    }

    pub async fn insert_file(&self, file: &ProjectFile) -> Result<(), SyncError> {
        self.files.insert(self.editor.as_ref(), file).await?;
        self.content_changed().await;
        Ok(())
    }

    pub async fn list_files(&self) -> Result<Vec<ProjectFile>, SyncError> {
        self.files.list().await
    }

    pub async fn file_download_url(&self, file_id: &str) -> Result<String, SyncError> {
        self.files.download_url(file_id).await
    }

    /// Snapshot the current title and editor content.
    pub async fn create_version(&self, note: Option<&str>) -> Result<DocumentVersion, VersionError> {
        let content = self.editor.html().await;
        let title = self.title();
        self.versions.create_manual(note, &title, &content).await
    }

    pub async fn list_versions(&self) -> Result<Vec<DocumentVersion>, VersionError> {
        self.versions.list().await
    }

    /// Restore a version into the editor. The replaced state is recorded as
    /// an auto version, then the passes run against the restored content so
    /// links and numbering follow it.
    pub async fn restore_version(&self, version_id: &str) -> Result<RestoreResult, VersionError> {
        let _cycle = self.save_cycle.lock().await;
        let _flight = Latch::hold(&self.save_in_flight);

        let content = self.editor.html().await;
        let title = self.title();
        let result = self.versions.restore(version_id, &title, &content).await?;

        self.editor.set_html(&result.restored_content).await?;
        {
            let mut state = self.state();
            state.set_content(result.restored_content.clone());
            state.persisted_content = result.restored_content.clone();
            state.title = result.restored_title.clone();
            state.persisted_title = result.restored_title.clone();
            state.document.content = result.restored_content.clone();
            state.document.title = result.restored_title.clone();
            state.save_due = None;
        }
        tracing::info!("Restored version {} of {}", version_id, self.doc);
        self.edited.notify_one();

        match self.reconcile(result.restored_content.clone()).await {
            Ok(report) => tracing::debug!("Reconciled restored {}: {:?}", self.doc, report),
            Err(e) => tracing::warn!("Reconciling restored {} failed: {}", self.doc, e),
        }
        Ok(result)
    }

    /// Fire-and-forget exit snapshot.
    pub fn send_exit_version(&self) {
        self.versions.exit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendCall, MemoryBackend};
    use crate::editor::MemoryEditor;

    async fn open(content: &str) -> (Arc<MemoryBackend>, Arc<MemoryEditor>, DocumentSession) {
        let backend = Arc::new(MemoryBackend::new());
        let doc = DocumentRef::new("p", "d");
        let mut document = Document::new("d", "Draft");
        document.content = content.to_string();
        backend.insert_document(&doc, document);
        let editor = Arc::new(MemoryEditor::new(""));
        let session = DocumentSession::open(
            backend.clone(),
            editor.clone(),
            doc,
            SyncTimings::default(),
        )
        .await
        .unwrap();
        (backend, editor, session)
    }

    #[tokio::test]
    async fn test_open_loads_content_into_editor() {
        let (_backend, editor, session) = open("<p>hello world</p>").await;
        assert_eq!(editor.html().await, "<p>hello world</p>");
        assert_eq!(session.metrics().words, 2);
        assert!(!session.is_dirty());
    }

    #[tokio::test]
    async fn test_save_persists_before_passes() {
        let (backend, editor, session) = open("<p></p>").await;
        editor.set_html("<p>typed</p>").await.unwrap();
        session.content_changed().await;
        backend.clear_calls();

        let report = session.save_now().await.unwrap();
        assert_eq!(report.citations, PassOutcome::Skipped);
        assert_eq!(report.statistics, PassOutcome::Clean);
        assert_eq!(report.files, PassOutcome::Clean);

        let names: Vec<_> = backend.calls().iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["update_document", "sync_statistics", "sync_file_usage"]);
        assert!(!session.is_dirty());
    }

    #[tokio::test]
    async fn test_failed_save_keeps_content_dirty() {
        let (backend, editor, session) = open("<p></p>").await;
        editor.set_html("<p>typed</p>").await.unwrap();
        session.content_changed().await;
        backend.fail("update_document");

        assert!(session.save_now().await.is_err());
        assert!(session.is_dirty());
        assert_eq!(editor.html().await, "<p>typed</p>");
        assert_eq!(session.persisted_content(), "<p></p>");
    }

    #[tokio::test]
    async fn test_pull_skipped_with_pending_edits() {
        let (_backend, editor, session) = open("<p></p>").await;
        editor.set_html("<p>unsaved</p>").await.unwrap();
        assert_eq!(
            session.pull_sync(PullTrigger::Focus).await,
            PullOutcome::Skipped(PullSkip::PendingEdits)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_pull_skipped_within_grace_window() {
        let (_backend, editor, session) = open("<p></p>").await;
        editor.set_html("<p>x</p>").await.unwrap();
        session.content_changed().await;
        session.save_now().await.unwrap();

        assert_eq!(
            session.pull_sync(PullTrigger::Interval).await,
            PullOutcome::Skipped(PullSkip::RecentEdit)
        );
        tokio::time::advance(Duration::from_millis(2600)).await;
        assert_eq!(session.pull_sync(PullTrigger::Interval).await, PullOutcome::Clean);
    }

    #[tokio::test]
    async fn test_load_pull_runs_once() {
        let (_backend, _editor, session) = open("<p></p>").await;
        assert_eq!(session.on_load().await, PullOutcome::Clean);
        assert_eq!(
            session.on_load().await,
            PullOutcome::Skipped(PullSkip::AlreadySynced)
        );
        assert_eq!(session.on_focus().await, PullOutcome::Clean);
    }

    #[tokio::test]
    async fn test_latch_rejects_concurrent_pull() {
        let (_backend, _editor, session) = open("<p></p>").await;
        let _held = Latch::try_acquire(&session.pull_in_flight).unwrap();
        assert_eq!(
            session.pull_sync(PullTrigger::Focus).await,
            PullOutcome::Skipped(PullSkip::InFlight)
        );
    }

    #[tokio::test]
    async fn test_title_change_is_saved() {
        let (backend, _editor, session) = open("<p></p>").await;
        session.set_title("Final");
        assert!(session.is_dirty());
        session.save_now().await.unwrap();
        assert!(backend.calls().iter().any(|c| matches!(
            c,
            BackendCall::UpdateDocument { title: Some(t), .. } if t == "Final"
        )));
        assert!(!session.is_dirty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_debounces_saves_and_sends_exit_version() {
        let (backend, editor, session) = open("<p></p>").await;
        let session = Arc::new(session);
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

        let runner = {
            let session = session.clone();
            tokio::spawn(async move {
                session
                    .run(async {
                        let _ = stop_rx.await;
                    })
                    .await;
            })
        };
        tokio::task::yield_now().await;

        for text in ["<p>a</p>", "<p>ab</p>", "<p>abc</p>"] {
            editor.set_html(text).await.unwrap();
            session.content_changed().await;
            tokio::time::advance(Duration::from_millis(500)).await;
        }
        let saves_before = count(&backend, "update_document");
        assert_eq!(saves_before, 0);

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(count(&backend, "update_document"), 1);
        assert_eq!(session.persisted_content(), "<p>abc</p>");

        let _ = stop_tx.send(());
        runner.await.unwrap();
        assert_eq!(count(&backend, "exit_beacon"), 1);
    }

    fn count(backend: &MemoryBackend, name: &str) -> usize {
        backend.calls().iter().filter(|c| c.name() == name).count()
    }
}

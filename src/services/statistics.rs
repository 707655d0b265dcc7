//! Statistics reconciler.
//!
//! Push sends document-side table/chart edits to the statistics store after
//! every save. Pull brings store-side edits and deletions back into the
//! document: deleted statistics lose their elements, tables whose structure
//! drifted are rebuilt from the stored data.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, LazyLock, Mutex, MutexGuard};

use scraper::Selector;

use crate::backend::{Backend, BackendError};
use crate::content::{attrs, render_statistic, render_table, splice, ContentScan, Splice};
use crate::editor::Editor;
use crate::models::{
    ChartConfig, DocumentRef, Statistic, StatisticUpdate, StatisticsSyncRequest, TableData,
};

use super::SyncError;

static STATISTIC_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("table[data-statistic-id], [data-chart-id]").expect("valid statistic selector")
});

/// Message shown when the user inserts a statistic that no longer exists.
const DELETED_MESSAGE: &str = "This statistic was deleted. The list has been refreshed.";

/// What a push changed upstream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PushReport {
    pub updated: Vec<String>,
    pub unchanged: usize,
    /// Ids whose update call failed or whose record could not be loaded.
    pub failed: Vec<String>,
}

/// What a pull changed in the document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PullReport {
    pub removed_tables: Vec<String>,
    pub rebuilt_tables: Vec<String>,
    pub removed_charts: Vec<String>,
    /// Rewritten content, when anything changed.
    pub content: Option<String>,
}

impl PullReport {
    pub fn is_clean(&self) -> bool {
        self.content.is_none()
    }
}

/// Result of an explicit statistic insert.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    Inserted(Statistic),
    /// The statistic was deleted upstream; nothing was inserted.
    Deleted {
        statistics: Vec<Statistic>,
        message: String,
    },
}

pub struct StatisticsReconciler {
    backend: Arc<dyn Backend>,
    doc: DocumentRef,
    known: Mutex<HashMap<String, Statistic>>,
}

impl StatisticsReconciler {
    pub fn new(backend: Arc<dyn Backend>, doc: DocumentRef) -> Self {
        Self {
            backend,
            doc,
            known: Mutex::new(HashMap::new()),
        }
    }

    fn known(&self) -> MutexGuard<'_, HashMap<String, Statistic>> {
        self.known.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn remember(&self, statistic: &Statistic) {
        self.known()
            .insert(statistic.id.clone(), statistic.clone());
    }

    /// Refresh the known-record cache from the project listing.
    pub async fn refresh(&self) -> Result<Vec<Statistic>, SyncError> {
        let listing = self.backend.list_statistics(&self.doc.project_id).await?;
        let mut known = self.known();
        known.clear();
        for statistic in &listing {
            known.insert(statistic.id.clone(), statistic.clone());
        }
        Ok(listing)
    }

    /// Last-known record, fetching it when it is not cached.
    async fn record(&self, statistic_id: &str) -> Result<Statistic, BackendError> {
        if let Some(statistic) = self.known().get(statistic_id).cloned() {
            return Ok(statistic);
        }
        let statistic = self
            .backend
            .get_statistic(&self.doc.project_id, statistic_id)
            .await?;
        self.remember(&statistic);
        Ok(statistic)
    }

    async fn push_one(
        &self,
        statistic_id: &str,
        data: &TableData,
        config: Option<ChartConfig>,
        report: &mut PushReport,
    ) {
        let record = match self.record(statistic_id).await {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("Cannot load statistic {}: {}", statistic_id, e);
                report.failed.push(statistic_id.to_string());
                return;
            }
        };
        if record.table_data.matches(data) {
            report.unchanged += 1;
            return;
        }

        let update = StatisticUpdate {
            title: None,
            config: config.map(|c| c.to_value()),
            table_data: Some(data.clone()),
        };
        match self
            .backend
            .update_statistic(&self.doc.project_id, statistic_id, &update)
            .await
        {
            Ok(updated) => {
                tracing::debug!("Pushed document edits to statistic {}", statistic_id);
                self.remember(&updated);
                report.updated.push(statistic_id.to_string());
            }
            Err(e) => {
                tracing::warn!("Failed to update statistic {}: {}", statistic_id, e);
                report.failed.push(statistic_id.to_string());
            }
        }
    }

    /// Push document-side values upstream, then sync the "used in" links
    /// to exactly the referenced ids.
    ///
    /// Individual update failures are reported, not returned; only a failed
    /// link sync is an error.
    pub async fn push(&self, scan: &ContentScan) -> Result<PushReport, SyncError> {
        let mut report = PushReport::default();
        let mut seen = HashSet::new();

        for table in scan.tables() {
            if seen.insert(table.statistic_id.as_str()) {
                self.push_one(&table.statistic_id, &table.data, None, &mut report)
                    .await;
            }
        }

        for chart in scan.charts() {
            if !seen.insert(chart.chart_id.as_str()) {
                continue;
            }
            // Without a readable blob there are no values to compare.
            let Some(payload) = &chart.payload else {
                continue;
            };
            let previous = ChartConfig::from_value(&payload.config);
            let config = ChartConfig::reconstruct(previous.as_ref(), &payload.table_data);
            self.push_one(&chart.chart_id, &payload.table_data, Some(config), &mut report)
                .await;
        }

        let request = StatisticsSyncRequest {
            document_id: self.doc.document_id.clone(),
            tables: scan.table_ids(),
            charts: scan.chart_ids(),
        };
        self.backend
            .sync_statistics(&self.doc.project_id, &request)
            .await?;

        Ok(report)
    }

    /// Compare embedded statistics with the store and compute the corrected
    /// content. Does not touch the editor.
    pub async fn pull(&self, html: &str) -> Result<PullReport, SyncError> {
        let scan = crate::content::scan(html);
        let table_ids = scan.table_ids();
        let chart_ids = scan.chart_ids();
        if table_ids.is_empty() && chart_ids.is_empty() {
            return Ok(PullReport::default());
        }

        let listing: Option<HashSet<String>> = match self.refresh().await {
            Ok(listing) => Some(listing.into_iter().map(|s| s.id).collect()),
            Err(e) => {
                tracing::warn!("Could not list statistics for {}: {}", self.doc, e);
                None
            }
        };

        let mut report = PullReport::default();
        let mut rebuilt: HashMap<String, TableData> = HashMap::new();

        for table in scan.tables() {
            let id = &table.statistic_id;
            if report.removed_tables.contains(id) || rebuilt.contains_key(id) {
                continue;
            }
            match self.backend.get_statistic(&self.doc.project_id, id).await {
                Ok(statistic) => {
                    if !statistic.table_data.matches(&table.data) {
                        rebuilt.insert(id.clone(), statistic.table_data.clone());
                        report.rebuilt_tables.push(id.clone());
                    }
                    self.remember(&statistic);
                }
                Err(BackendError::NotFound(_)) => report.removed_tables.push(id.clone()),
                Err(e) => tracing::warn!("Could not fetch statistic {}: {}", id, e),
            }
        }

        if let Some(listing) = &listing {
            report.removed_charts = chart_ids
                .into_iter()
                .filter(|id| !listing.contains(id))
                .collect();
        }

        if report.removed_tables.is_empty()
            && report.rebuilt_tables.is_empty()
            && report.removed_charts.is_empty()
        {
            return Ok(report);
        }

        report.content = splice(html, &STATISTIC_SELECTOR, |element| {
            let el = element.value();
            if el.name() == "table" {
                let id = el.attr(attrs::STATISTIC_ID)?.trim();
                if report.removed_tables.iter().any(|r| r == id) {
                    return Some(Splice::Remove);
                }
                return rebuilt
                    .get(id)
                    .map(|data| Splice::Replace(render_table(id, data)));
            }
            let id = el.attr(attrs::CHART_ID)?.trim();
            report
                .removed_charts
                .iter()
                .any(|r| r == id)
                .then_some(Splice::Remove)
        });

        tracing::info!(
            "Statistics pull for {}: {} tables removed, {} rebuilt, {} charts removed",
            self.doc,
            report.removed_tables.len(),
            report.rebuilt_tables.len(),
            report.removed_charts.len()
        );
        Ok(report)
    }

    /// Insert a statistic at the editor cursor and mark it used.
    pub async fn insert(
        &self,
        editor: &dyn Editor,
        statistic_id: &str,
    ) -> Result<InsertOutcome, SyncError> {
        let statistic = match self
            .backend
            .get_statistic(&self.doc.project_id, statistic_id)
            .await
        {
            Ok(statistic) => statistic,
            Err(BackendError::NotFound(_)) => {
                tracing::info!("Statistic {} was deleted before insert", statistic_id);
                self.known().remove(statistic_id);
                let statistics = self.refresh().await?;
                return Ok(InsertOutcome::Deleted {
                    statistics,
                    message: DELETED_MESSAGE.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        editor.insert_html(&render_statistic(&statistic)).await?;
        self.remember(&statistic);

        if let Err(e) = self
            .backend
            .mark_statistic_used(&self.doc.project_id, &statistic.id, &self.doc.document_id)
            .await
        {
            tracing::warn!("Failed to mark statistic {} used: {}", statistic.id, e);
        }
        Ok(InsertOutcome::Inserted(statistic))
    }
}

//! Statistic (table/chart) models.

use serde::{Deserialize, Serialize};

/// Kind of statistic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatisticType {
    Table,
    Chart,
}

impl StatisticType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::Chart => "chart",
        }
    }
}

/// Tabular data shared by tables and the charts built from them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableData {
    #[serde(default)]
    pub headers: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Vec<String>>,
}

impl TableData {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    /// Compare data values only: header text, row count and cell text,
    /// each cell trimmed.
    pub fn matches(&self, other: &TableData) -> bool {
        cells_match(&self.headers, &other.headers)
            && self.rows.len() == other.rows.len()
            && self
                .rows
                .iter()
                .zip(&other.rows)
                .all(|(a, b)| cells_match(a, b))
    }

    /// Widest row, headers included.
    pub fn column_count(&self) -> usize {
        self.rows
            .iter()
            .map(Vec::len)
            .chain(std::iter::once(self.headers.len()))
            .max()
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty() && self.rows.is_empty()
    }
}

fn cells_match(a: &[String], b: &[String]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.trim() == y.trim())
}

/// Chart configuration as stored alongside a chart statistic.
///
/// Unknown keys are carried through untouched in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartConfig {
    #[serde(rename = "type", default = "default_chart_type")]
    pub chart_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub label_column: usize,
    #[serde(default)]
    pub data_columns: Vec<usize>,
    #[serde(default)]
    pub x_column: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y_column: Option<usize>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_chart_type() -> String {
    "bar".to_string()
}

impl ChartConfig {
    /// Read a config from its JSON form, if it has a usable shape.
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Best-effort column configuration for new table data.
    ///
    /// Keeps the previous chart type, title and column choices where they
    /// still fit the data. Otherwise every column except the label column
    /// becomes a data column, and `x_column` is the first data column
    /// (or 0 when there is none). This is a heuristic, not an inverse of
    /// what the user configured.
    pub fn reconstruct(previous: Option<&ChartConfig>, data: &TableData) -> ChartConfig {
        let columns = data.column_count();

        let label_column = previous
            .map(|p| p.label_column)
            .filter(|c| *c < columns)
            .unwrap_or(0);

        let mut data_columns: Vec<usize> = previous
            .map(|p| {
                p.data_columns
                    .iter()
                    .copied()
                    .filter(|c| *c < columns)
                    .collect()
            })
            .unwrap_or_default();
        if data_columns.is_empty() {
            data_columns = (0..columns).filter(|c| *c != label_column).collect();
        }

        let x_column = data_columns.first().copied().unwrap_or(0);
        let y_column = data_columns.get(1).copied();

        ChartConfig {
            chart_type: previous
                .map(|p| p.chart_type.clone())
                .unwrap_or_else(default_chart_type),
            title: previous.and_then(|p| p.title.clone()),
            label_column,
            data_columns,
            x_column,
            y_column,
            extra: previous.map(|p| p.extra.clone()).unwrap_or_default(),
        }
    }
}

/// A table or chart owned by the statistics store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statistic {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "type")]
    pub kind: StatisticType,
    #[serde(default)]
    pub config: serde_json::Value,
    #[serde(default)]
    pub table_data: TableData,
    #[serde(default)]
    pub used_in_documents: Vec<String>,
}

impl Statistic {
    pub fn chart_config(&self) -> Option<ChartConfig> {
        ChartConfig::from_value(&self.config)
    }
}

/// Payload for creating a statistic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewStatistic {
    pub title: String,
    #[serde(rename = "type")]
    pub kind: StatisticType,
    #[serde(default)]
    pub config: serde_json::Value,
    #[serde(default)]
    pub table_data: TableData,
}

/// Partial statistic update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatisticUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_data: Option<TableData>,
}

/// Bulk "used in document" sync. Lists exactly the ids referenced by the
/// document, so the store can drop links to everything else.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsSyncRequest {
    pub document_id: String,
    pub tables: Vec<String>,
    pub charts: Vec<String>,
}

impl StatisticsSyncRequest {
    /// All referenced ids, tables first.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().chain(&self.charts).map(String::as_str)
    }
}

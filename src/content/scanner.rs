//! Content scanner: extracts typed references from document HTML.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

use super::attrs;
use crate::models::TableData;
use crate::utils::html_unescape;

static UUID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .expect("valid uuid pattern")
});

static REFERENCE_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("[data-citation-id], table[data-statistic-id], [data-chart-id], [data-file-id]")
        .expect("valid reference selector")
});

/// Strict 8-4-4-4-12 hex UUID check.
pub fn is_uuid(s: &str) -> bool {
    UUID_PATTERN.is_match(s)
}

/// An inline citation marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CitationRef {
    pub citation_id: String,
    /// Rendered number, if the marker carries a valid one.
    pub number: Option<u32>,
    pub sub_number: u32,
    pub article_id: Option<String>,
}

/// An embedded statistics table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableRef {
    pub statistic_id: String,
    pub data: TableData,
}

/// The serialized blob carried by a chart element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartPayload {
    #[serde(default)]
    pub config: serde_json::Value,
    #[serde(default)]
    pub table_data: TableData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_id: Option<String>,
}

/// An embedded chart. `payload` is `None` when the blob is missing or
/// malformed; the id alone still counts as a reference.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartRef {
    pub chart_id: String,
    pub payload: Option<ChartPayload>,
}

/// A reference to a project file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRef {
    pub file_id: String,
}

/// A typed reference found in document content, in document order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentReference {
    Citation(CitationRef),
    Table(TableRef),
    Chart(ChartRef),
    File(FileRef),
}

/// Numbering metadata read from a citation marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CitationMeta {
    pub number: Option<u32>,
    pub sub_number: u32,
    pub article_id: Option<String>,
}

/// Everything the reconciliation passes need to know about a document's
/// embedded references.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ContentScan {
    pub references: Vec<ContentReference>,
}

impl ContentScan {
    pub fn citations(&self) -> impl Iterator<Item = &CitationRef> {
        self.references.iter().filter_map(|r| match r {
            ContentReference::Citation(c) => Some(c),
            _ => None,
        })
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableRef> {
        self.references.iter().filter_map(|r| match r {
            ContentReference::Table(t) => Some(t),
            _ => None,
        })
    }

    pub fn charts(&self) -> impl Iterator<Item = &ChartRef> {
        self.references.iter().filter_map(|r| match r {
            ContentReference::Chart(c) => Some(c),
            _ => None,
        })
    }

    /// Set of citation ids present, for "did citations change" checks.
    pub fn citation_ids(&self) -> BTreeSet<&str> {
        self.citations().map(|c| c.citation_id.as_str()).collect()
    }

    /// Distinct citation ids in first-appearance order.
    pub fn ordered_citation_ids(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.citations()
            .filter(|c| seen.insert(c.citation_id.as_str()))
            .map(|c| c.citation_id.clone())
            .collect()
    }

    /// Citation id to the metadata of its first marker.
    pub fn citation_meta(&self) -> HashMap<String, CitationMeta> {
        let mut meta = HashMap::new();
        for c in self.citations() {
            meta.entry(c.citation_id.clone()).or_insert_with(|| CitationMeta {
                number: c.number,
                sub_number: c.sub_number,
                article_id: c.article_id.clone(),
            });
        }
        meta
    }

    /// Distinct table statistic ids in document order.
    pub fn table_ids(&self) -> Vec<String> {
        dedup(self.tables().map(|t| t.statistic_id.as_str()))
    }

    /// Distinct chart ids in document order.
    pub fn chart_ids(&self) -> Vec<String> {
        dedup(self.charts().map(|c| c.chart_id.as_str()))
    }

    /// File ids in document order. Duplicates are kept.
    pub fn file_ids(&self) -> Vec<String> {
        self.references
            .iter()
            .filter_map(|r| match r {
                ContentReference::File(f) => Some(f.file_id.clone()),
                _ => None,
            })
            .collect()
    }
}

fn dedup<'a>(ids: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.filter(|id| seen.insert(*id)).map(str::to_string).collect()
}

/// Scan HTML for embedded references.
///
/// Never fails: malformed markup, attributes or JSON simply yield fewer
/// references.
pub fn scan(html: &str) -> ContentScan {
    if html.trim().is_empty() {
        return ContentScan::default();
    }

    let fragment = Html::parse_fragment(html);
    let mut references = Vec::new();

    for element in fragment.select(&REFERENCE_SELECTOR) {
        let el = element.value();

        if let Some(citation_id) = non_empty(el.attr(attrs::CITATION_ID)) {
            references.push(ContentReference::Citation(CitationRef {
                citation_id: citation_id.to_string(),
                number: parse_positive(el.attr(attrs::CITATION_NUMBER)),
                sub_number: parse_positive(el.attr(attrs::SUB_NUMBER)).unwrap_or(1),
                article_id: non_empty(el.attr(attrs::ARTICLE_ID)).map(str::to_string),
            }));
        }

        if el.name() == "table" {
            if let Some(id) = el.attr(attrs::STATISTIC_ID).map(str::trim).filter(|id| is_uuid(id)) {
                references.push(ContentReference::Table(TableRef {
                    statistic_id: id.to_string(),
                    data: read_table(element),
                }));
            }
        }

        if let Some(id) = el.attr(attrs::CHART_ID).map(str::trim).filter(|id| is_uuid(id)) {
            let payload = el
                .attr(attrs::CHART_DATA)
                .or_else(|| el.attr(attrs::CHART_CONFIG))
                .and_then(parse_chart_payload);
            references.push(ContentReference::Chart(ChartRef {
                chart_id: id.to_string(),
                payload,
            }));
        }

        if let Some(file_id) = non_empty(el.attr(attrs::FILE_ID)) {
            references.push(ContentReference::File(FileRef {
                file_id: file_id.to_string(),
            }));
        }
    }

    ContentScan { references }
}

/// Read the data values of a table element, ignoring markup.
///
/// The first row counts as headers when it contains `<th>` cells.
pub(crate) fn read_table(table: ElementRef<'_>) -> TableData {
    let mut rows = table_rows(table)
        .into_iter()
        .map(|row| {
            let cells: Vec<ElementRef<'_>> = row
                .children()
                .filter_map(ElementRef::wrap)
                .filter(|c| matches!(c.value().name(), "td" | "th"))
                .collect();
            let has_header_cells = cells.iter().any(|c| c.value().name() == "th");
            let text = cells.iter().map(|c| cell_text(*c)).collect::<Vec<_>>();
            (has_header_cells, text)
        })
        .peekable();

    let headers = match rows.peek() {
        Some((true, _)) => rows.next().map(|(_, cells)| cells).unwrap_or_default(),
        _ => Vec::new(),
    };

    TableData {
        headers,
        rows: rows.map(|(_, cells)| cells).collect(),
    }
}

/// Direct rows of a table, looking through `thead`/`tbody`/`tfoot` but not
/// into nested tables.
fn table_rows(table: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    let mut rows = Vec::new();
    for child in table.children().filter_map(ElementRef::wrap) {
        match child.value().name() {
            "tr" => rows.push(child),
            "thead" | "tbody" | "tfoot" => rows.extend(
                child
                    .children()
                    .filter_map(ElementRef::wrap)
                    .filter(|c| c.value().name() == "tr"),
            ),
            _ => {}
        }
    }
    rows
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text().collect::<String>().trim().to_string()
}

fn parse_chart_payload(raw: &str) -> Option<ChartPayload> {
    serde_json::from_str(raw)
        .or_else(|_| serde_json::from_str(&html_unescape(raw)))
        .ok()
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn parse_positive(value: Option<&str>) -> Option<u32> {
    value
        .and_then(|v| v.trim().parse::<u32>().ok())
        .filter(|n| *n >= 1)
}

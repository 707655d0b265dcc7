//! Embedded content references.
//!
//! The editor serializes citations, tables, charts and file references as
//! HTML elements carrying `data-*` attributes. This module is the boundary
//! between that encoding and the typed [`ContentReference`] records the
//! reconciliation passes work with:
//! - `scanner`: HTML to typed references (pure, never fails)
//! - `rewrite`: in-place removal/replacement of referenced elements
//! - `render`: typed records back to HTML elements
//! - `numbering`: compact citation numbering and its application to HTML
//! - `metrics`: word/character/page counts

mod metrics;
pub mod numbering;
mod render;
mod rewrite;
mod scanner;

pub use metrics::ContentMetrics;
pub use render::{render_chart, render_citation, render_file, render_statistic, render_table};
pub use rewrite::{rebuild_element, splice, Splice};
pub use scanner::{
    is_uuid, scan, ChartPayload, ChartRef, CitationMeta, CitationRef, ContentReference,
    ContentScan, FileRef, TableRef,
};

/// Attribute names of the embedded micro-format.
pub mod attrs {
    pub const CITATION_ID: &str = "data-citation-id";
    pub const CITATION_NUMBER: &str = "data-citation-number";
    pub const SUB_NUMBER: &str = "data-sub-number";
    pub const ARTICLE_ID: &str = "data-article-id";
    pub const STATISTIC_ID: &str = "data-statistic-id";
    pub const CHART_ID: &str = "data-chart-id";
    pub const CHART_DATA: &str = "data-chart";
    pub const CHART_CONFIG: &str = "data-config";
    pub const FILE_ID: &str = "data-file-id";
}

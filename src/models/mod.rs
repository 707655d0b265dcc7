//! Data models for documents and the entity stores they embed.

mod citation;
mod document;
mod file;
mod statistic;
mod version;

pub use citation::Citation;
pub(crate) use citation::citation_label;
pub use document::{Document, DocumentRef, DocumentUpdate};
pub use file::ProjectFile;
pub use statistic::{
    ChartConfig, NewStatistic, Statistic, StatisticType, StatisticUpdate, StatisticsSyncRequest,
    TableData,
};
pub use version::{AutoVersionResult, DocumentVersion, NewVersion, RestoreResult, VersionType};

//! Document version snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a version came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionType {
    Manual,
    Auto,
    Exit,
}

impl VersionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Auto => "auto",
            Self::Exit => "exit",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "manual" => Some(Self::Manual),
            "auto" => Some(Self::Auto),
            "exit" => Some(Self::Exit),
            _ => None,
        }
    }
}

/// An immutable snapshot of a document. Never mutated or deleted by clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentVersion {
    pub id: String,
    /// Monotonic per document.
    pub version_number: u32,
    pub version_type: VersionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_note: Option<String>,
    pub content_length: usize,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub created_by: String,
}

/// Request to create a version.
///
/// `title` and `content` let the client snapshot a state other than the
/// one currently stored (used to record the state replaced by a restore).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewVersion {
    pub version_type: VersionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl NewVersion {
    pub fn new(version_type: VersionType, note: Option<String>) -> Self {
        Self {
            version_type,
            version_note: note,
            title: None,
            content: None,
        }
    }
}

/// Outcome of restoring a version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreResult {
    pub success: bool,
    #[serde(default)]
    pub restored_content: String,
    #[serde(default)]
    pub restored_title: String,
}

/// Server decision on whether the current content warranted a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoVersionResult {
    pub created: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

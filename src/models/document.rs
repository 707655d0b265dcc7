//! Document models.
//!
//! The backend owns documents. Clients hold a cached copy plus a separately
//! tracked live content string (see `services::session`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Citation;

/// Address of a document within a project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentRef {
    pub project_id: String,
    pub document_id: String,
}

impl DocumentRef {
    pub fn new(project_id: impl Into<String>, document_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            document_id: document_id.into(),
        }
    }
}

impl std::fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.project_id, self.document_id)
    }
}

/// A rich-text document with embedded entity references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    /// Serialized HTML content.
    #[serde(default)]
    pub content: String,
    /// Citations attached to this document, in `order_index` order.
    #[serde(default)]
    pub citations: Vec<Citation>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// Create an empty document.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            content: String::new(),
            citations: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    /// Find a citation by id.
    pub fn citation(&self, citation_id: &str) -> Option<&Citation> {
        self.citations.iter().find(|c| c.id == citation_id)
    }
}

/// Partial document update. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl DocumentUpdate {
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            title: None,
            content: Some(content.into()),
        }
    }

    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            content: None,
        }
    }
}

//! Project file library entries.

use serde::{Deserialize, Serialize};

/// An uploaded file that documents may reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectFile {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub size_formatted: String,
}

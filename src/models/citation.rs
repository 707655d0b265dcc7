//! Citation records held by the numbering authority.

use serde::{Deserialize, Serialize};

/// A citation of an article within one document.
///
/// In-use `inline_number`s form a compact `1..=K` sequence ordered by first
/// appearance. Citations of the same article share `inline_number` and are
/// told apart by `sub_number`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub id: String,
    #[serde(rename = "articleId", alias = "article_id")]
    pub article_id: String,
    pub inline_number: u32,
    #[serde(default = "default_sub_number")]
    pub sub_number: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default)]
    pub order_index: u32,
}

fn default_sub_number() -> u32 {
    1
}

impl Citation {
    /// Display label, `[n]` for the first citation of an article and `[n.s]` after.
    pub fn label(&self) -> String {
        citation_label(self.inline_number, self.sub_number)
    }
}

pub(crate) fn citation_label(number: u32, sub_number: u32) -> String {
    if sub_number <= 1 {
        format!("[{}]", number)
    } else {
        format!("[{}.{}]", number, sub_number)
    }
}

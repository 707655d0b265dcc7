//! String-backed editor.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use scraper::Selector;
use tokio::sync::RwLock;

use super::{Editor, EditorResult, Settled};
use crate::content::numbering::renumber_html;
use crate::content::{attrs, splice, Splice};

static CITATION_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("[data-citation-id]").expect("valid citation selector"));

/// Editor holding its content in memory.
///
/// Inserts append at the end of the content (the cursor is always at the
/// end). Renumbering is applied after `settle_delay`, the way a real editor
/// applies it on its next transaction.
#[derive(Debug, Clone, Default)]
pub struct MemoryEditor {
    content: Arc<RwLock<String>>,
    settle_delay: Duration,
    renumbers: Arc<AtomicUsize>,
}

impl MemoryEditor {
    pub fn new(html: impl Into<String>) -> Self {
        Self {
            content: Arc::new(RwLock::new(html.into())),
            ..Default::default()
        }
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Number of completed renumbering passes.
    pub fn renumber_count(&self) -> usize {
        self.renumbers.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Editor for MemoryEditor {
    async fn html(&self) -> String {
        self.content.read().await.clone()
    }

    async fn set_html(&self, html: &str) -> EditorResult<()> {
        *self.content.write().await = html.to_string();
        Ok(())
    }

    async fn insert_html(&self, html: &str) -> EditorResult<()> {
        self.content.write().await.push_str(html);
        Ok(())
    }

    async fn remove_citation(&self, citation_id: &str) -> EditorResult<usize> {
        let mut content = self.content.write().await;
        let mut removed = 0;
        let updated = splice(&content, &CITATION_SELECTOR, |element| {
            let id = element.value().attr(attrs::CITATION_ID)?;
            (id.trim() == citation_id).then(|| {
                removed += 1;
                Splice::Remove
            })
        });
        if let Some(updated) = updated {
            *content = updated;
        }
        Ok(removed)
    }

    fn renumber_citations(&self) -> Settled {
        let content = Arc::clone(&self.content);
        let renumbers = Arc::clone(&self.renumbers);
        let delay = self.settle_delay;
        Box::pin(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let mut content = content.write().await;
            if let Some(renumbered) = renumber_html(&content) {
                *content = renumbered;
            }
            renumbers.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}

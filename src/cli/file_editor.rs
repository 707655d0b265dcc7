//! Editor backed by a file on disk, for `watch`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::editor::{Editor, EditorResult, MemoryEditor, Settled};

/// Mirrors its content into a file. Changes made to the file by other
/// programs are picked up with [`FileEditor::reload`].
#[derive(Debug, Clone)]
pub struct FileEditor {
    path: PathBuf,
    inner: MemoryEditor,
}

impl FileEditor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            inner: MemoryEditor::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the file. Returns true when its content differs from what the
    /// editor held.
    pub async fn reload(&self) -> EditorResult<bool> {
        let on_disk = tokio::fs::read_to_string(&self.path).await?;
        if on_disk == self.inner.html().await {
            return Ok(false);
        }
        self.inner.set_html(&on_disk).await?;
        Ok(true)
    }

    async fn flush(&self) -> EditorResult<()> {
        let html = self.inner.html().await;
        tokio::fs::write(&self.path, html).await?;
        Ok(())
    }
}

#[async_trait]
impl Editor for FileEditor {
    async fn html(&self) -> String {
        self.inner.html().await
    }

    async fn set_html(&self, html: &str) -> EditorResult<()> {
        self.inner.set_html(html).await?;
        self.flush().await
    }

    async fn insert_html(&self, html: &str) -> EditorResult<()> {
        self.inner.insert_html(html).await?;
        self.flush().await
    }

    async fn remove_citation(&self, citation_id: &str) -> EditorResult<usize> {
        let removed = self.inner.remove_citation(citation_id).await?;
        if removed > 0 {
            self.flush().await?;
        }
        Ok(removed)
    }

    fn renumber_citations(&self) -> Settled {
        let editor = self.clone();
        Box::pin(async move {
            editor.inner.renumber_citations().await?;
            editor.flush().await
        })
    }
}

//! REST implementation of the backend contract.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::{Backend, BackendError, BackendResult};
use crate::models::{
    AutoVersionResult, Citation, Document, DocumentRef, DocumentUpdate, DocumentVersion,
    NewStatistic, NewVersion, ProjectFile, RestoreResult, Statistic, StatisticUpdate,
    StatisticsSyncRequest, VersionType,
};

/// HTTP client for the document API.
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpBackend {
    /// Create a client for the API rooted at `base_url`.
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> BackendResult<Self> {
        let parsed = url::Url::parse(base_url)
            .map_err(|e| BackendError::Invalid(format!("bad API base URL '{}': {}", base_url, e)))?;
        let client = Client::builder()
            .user_agent(concat!("docsync/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .gzip(true)
            .brotli(true)
            .build()
            .expect("Failed to create HTTP client");

        Ok(Self {
            client,
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
            token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn document_path(doc: &DocumentRef) -> String {
        format!(
            "/projects/{}/documents/{}",
            urlencode(&doc.project_id),
            urlencode(&doc.document_id)
        )
    }

    fn statistics_path(project_id: &str) -> String {
        format!("/projects/{}/statistics", urlencode(project_id))
    }

    fn files_path(project_id: &str) -> String {
        format!("/projects/{}/files", urlencode(project_id))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> BackendResult<reqwest::Response> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| BackendError::Connection(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(BackendError::NotFound(response.url().path().to_string()));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(BackendError::Http {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> BackendResult<T> {
        self.send(request)
            .await?
            .json()
            .await
            .map_err(|e| BackendError::Parse(e.to_string()))
    }

    async fn send_empty(&self, request: RequestBuilder) -> BackendResult<()> {
        self.send(request).await.map(|_| ())
    }
}

fn urlencode(segment: &str) -> String {
    urlencoding::encode(segment).into_owned()
}

#[async_trait]
impl Backend for HttpBackend {
    async fn get_document(&self, doc: &DocumentRef) -> BackendResult<Document> {
        let url = self.url(&Self::document_path(doc));
        self.send_json(self.client.get(url)).await
    }

    async fn update_document(
        &self,
        doc: &DocumentRef,
        update: &DocumentUpdate,
    ) -> BackendResult<Document> {
        let url = self.url(&Self::document_path(doc));
        self.send_json(self.client.put(url).json(update)).await
    }

    async fn add_citation(&self, doc: &DocumentRef, article_id: &str) -> BackendResult<Citation> {
        let url = self.url(&format!("{}/citations", Self::document_path(doc)));
        let body = serde_json::json!({ "articleId": article_id });
        self.send_json(self.client.post(url).json(&body)).await
    }

    async fn remove_citation(&self, doc: &DocumentRef, citation_id: &str) -> BackendResult<()> {
        let url = self.url(&format!(
            "{}/citations/{}",
            Self::document_path(doc),
            urlencode(citation_id)
        ));
        self.send_empty(self.client.delete(url)).await
    }

    async fn update_citation(
        &self,
        doc: &DocumentRef,
        citation_id: &str,
        note: Option<&str>,
    ) -> BackendResult<Citation> {
        let url = self.url(&format!(
            "{}/citations/{}",
            Self::document_path(doc),
            urlencode(citation_id)
        ));
        let body = serde_json::json!({ "note": note });
        self.send_json(self.client.patch(url).json(&body)).await
    }

    async fn sync_citations(
        &self,
        doc: &DocumentRef,
        ordered_citation_ids: &[String],
    ) -> BackendResult<Document> {
        let url = self.url(&format!("{}/citations/sync", Self::document_path(doc)));
        let body = serde_json::json!({ "citationIds": ordered_citation_ids });
        debug!("Syncing {} citations for {}", ordered_citation_ids.len(), doc);
        self.send_json(self.client.post(url).json(&body)).await
    }

    async fn get_statistic(
        &self,
        project_id: &str,
        statistic_id: &str,
    ) -> BackendResult<Statistic> {
        let url = self.url(&format!(
            "{}/{}",
            Self::statistics_path(project_id),
            urlencode(statistic_id)
        ));
        self.send_json(self.client.get(url)).await
    }

    async fn list_statistics(&self, project_id: &str) -> BackendResult<Vec<Statistic>> {
        let url = self.url(&Self::statistics_path(project_id));
        self.send_json(self.client.get(url)).await
    }

    async fn create_statistic(
        &self,
        project_id: &str,
        statistic: &NewStatistic,
    ) -> BackendResult<Statistic> {
        let url = self.url(&Self::statistics_path(project_id));
        self.send_json(self.client.post(url).json(statistic)).await
    }

    async fn update_statistic(
        &self,
        project_id: &str,
        statistic_id: &str,
        update: &StatisticUpdate,
    ) -> BackendResult<Statistic> {
        let url = self.url(&format!(
            "{}/{}",
            Self::statistics_path(project_id),
            urlencode(statistic_id)
        ));
        self.send_json(self.client.patch(url).json(update)).await
    }

    async fn sync_statistics(
        &self,
        project_id: &str,
        request: &StatisticsSyncRequest,
    ) -> BackendResult<()> {
        let url = self.url(&format!("{}/sync", Self::statistics_path(project_id)));
        self.send_empty(self.client.post(url).json(request)).await
    }

    async fn mark_statistic_used(
        &self,
        project_id: &str,
        statistic_id: &str,
        document_id: &str,
    ) -> BackendResult<()> {
        let url = self.url(&format!(
            "{}/{}/used",
            Self::statistics_path(project_id),
            urlencode(statistic_id)
        ));
        let body = serde_json::json!({ "documentId": document_id });
        self.send_empty(self.client.post(url).json(&body)).await
    }

    async fn list_files(&self, project_id: &str) -> BackendResult<Vec<ProjectFile>> {
        let url = self.url(&Self::files_path(project_id));
        self.send_json(self.client.get(url)).await
    }

    async fn file_download_url(&self, project_id: &str, file_id: &str) -> BackendResult<String> {
        #[derive(Deserialize)]
        struct DownloadUrl {
            url: String,
        }

        let url = self.url(&format!(
            "{}/{}/download",
            Self::files_path(project_id),
            urlencode(file_id)
        ));
        let response: DownloadUrl = self.send_json(self.client.get(url)).await?;
        Ok(response.url)
    }

    async fn mark_file_used(
        &self,
        project_id: &str,
        file_id: &str,
        document_id: &str,
    ) -> BackendResult<()> {
        let url = self.url(&format!(
            "{}/{}/used",
            Self::files_path(project_id),
            urlencode(file_id)
        ));
        let body = serde_json::json!({ "documentId": document_id });
        self.send_empty(self.client.post(url).json(&body)).await
    }

    async fn sync_file_usage(&self, doc: &DocumentRef, file_ids: &[String]) -> BackendResult<()> {
        let url = self.url(&format!("{}/files/sync", Self::document_path(doc)));
        let body = serde_json::json!({ "fileIds": file_ids });
        self.send_empty(self.client.post(url).json(&body)).await
    }

    async fn list_versions(&self, doc: &DocumentRef) -> BackendResult<Vec<DocumentVersion>> {
        let url = self.url(&format!("{}/versions", Self::document_path(doc)));
        self.send_json(self.client.get(url)).await
    }

    async fn create_version(
        &self,
        doc: &DocumentRef,
        version: &NewVersion,
    ) -> BackendResult<DocumentVersion> {
        let url = self.url(&format!("{}/versions", Self::document_path(doc)));
        self.send_json(self.client.post(url).json(version)).await
    }

    async fn restore_version(
        &self,
        doc: &DocumentRef,
        version_id: &str,
    ) -> BackendResult<RestoreResult> {
        let url = self.url(&format!(
            "{}/versions/{}/restore",
            Self::document_path(doc),
            urlencode(version_id)
        ));
        self.send_json(self.client.post(url)).await
    }

    async fn trigger_auto_version(
        &self,
        doc: &DocumentRef,
        content: &str,
    ) -> BackendResult<AutoVersionResult> {
        let url = self.url(&format!("{}/versions/auto", Self::document_path(doc)));
        let body = serde_json::json!({ "content": content });
        self.send_json(self.client.post(url).json(&body)).await
    }

    fn send_exit_beacon(&self, doc: &DocumentRef, note: &str) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!("No runtime available, dropping exit version for {}", doc);
            return;
        };

        let url = self.url(&format!("{}/versions", Self::document_path(doc)));
        let body = NewVersion::new(VersionType::Exit, Some(note.to_string()));
        let request = self.authorize(self.client.post(url).json(&body));
        let doc = doc.clone();
        handle.spawn(async move {
            if let Err(e) = request.send().await {
                debug!("Exit version for {} not delivered: {}", doc, e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_invalid_base_url() {
        let result = HttpBackend::new("not a url", None, Duration::from_secs(5));
        assert!(matches!(result, Err(BackendError::Invalid(_))));
    }

    #[test]
    fn test_paths_are_encoded() {
        let backend =
            HttpBackend::new("https://api.example.com/v1/", None, Duration::from_secs(5)).unwrap();
        let doc = DocumentRef::new("p 1", "d/2");
        assert_eq!(
            backend.url(&HttpBackend::document_path(&doc)),
            "https://api.example.com/v1/projects/p%201/documents/d%2F2"
        );
    }
}

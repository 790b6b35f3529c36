//! HTTP connector for the run server's JSON endpoints.

use std::collections::BTreeMap;

use acorn_protocol::{
    FileDetail, FileSource, ImportRequest, NotionFile, NotionStatus, ScriptListing, SyncRequest,
    Tool,
};
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::{ConnectorError, KnowledgeSource, ToolSource};

/// Thin client over the server's `/api` routes (cheap to Clone).
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ConnectorError> {
        let url = self.url(path);
        debug!(component = "api", event = "api.request", method = "GET", url = %url);
        let response = self.http.get(&url).send().await?;
        Ok(check_status(response).await?.json().await?)
    }

    async fn post<B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response, ConnectorError> {
        let url = self.url(path);
        debug!(component = "api", event = "api.request", method = "POST", url = %url);
        let response = self.http.post(&url).json(body).send().await?;
        check_status(response).await
    }

    /// `GET /api/file`: script file name → description
    pub async fn list_scripts(&self) -> Result<ScriptListing, ConnectorError> {
        self.get_json("/api/file").await
    }

    /// `GET /api/file/{name}`: entry tool of a script
    pub async fn fetch_tool(&self, file: &str) -> Result<Tool, ConnectorError> {
        self.get_json(&format!("/api/file/{}", urlencoding::encode(file)))
            .await
    }

    pub async fn notion_configured(&self) -> Result<bool, ConnectorError> {
        let status: NotionStatus = self.get_json("/api/knowledge/notion/configured").await?;
        Ok(status.configured)
    }

    pub async fn notion_files(&self) -> Result<BTreeMap<String, NotionFile>, ConnectorError> {
        self.get_json("/api/knowledge/notion/files").await
    }

    pub async fn sync_files(
        &self,
        ids: &[String],
        source: FileSource,
    ) -> Result<(), ConnectorError> {
        let body = SyncRequest {
            files: ids.to_vec(),
            source,
        };
        self.post("/api/knowledge/sync", &body).await?;
        Ok(())
    }

    pub async fn import_files(
        &self,
        ids: &[String],
    ) -> Result<BTreeMap<String, FileDetail>, ConnectorError> {
        let body = ImportRequest {
            files: ids.to_vec(),
        };
        Ok(self.post("/api/knowledge/import", &body).await?.json().await?)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ConnectorError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ConnectorError::Status {
        status: status.as_u16(),
        body,
    })
}

impl ToolSource for ApiClient {
    fn fetch_tool<'a>(&'a self, file: &'a str) -> BoxFuture<'a, Result<Tool, ConnectorError>> {
        Box::pin(ApiClient::fetch_tool(self, file))
    }
}

impl KnowledgeSource for ApiClient {
    fn notion_configured(&self) -> BoxFuture<'_, Result<bool, ConnectorError>> {
        Box::pin(ApiClient::notion_configured(self))
    }

    fn notion_files(&self) -> BoxFuture<'_, Result<BTreeMap<String, NotionFile>, ConnectorError>> {
        Box::pin(ApiClient::notion_files(self))
    }

    fn sync_files<'a>(
        &'a self,
        ids: &'a [String],
        source: FileSource,
    ) -> BoxFuture<'a, Result<(), ConnectorError>> {
        Box::pin(ApiClient::sync_files(self, ids, source))
    }

    fn import_files<'a>(
        &'a self,
        ids: &'a [String],
    ) -> BoxFuture<'a, Result<BTreeMap<String, FileDetail>, ConnectorError>> {
        Box::pin(ApiClient::import_files(self, ids))
    }
}

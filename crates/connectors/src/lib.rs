//! Acorn Connectors
//!
//! Connectors to the run server. The socket connector carries a single run
//! session (run requests out, execution frames back); the HTTP connector
//! covers the JSON endpoints for scripts and knowledge files.

pub mod api;
pub mod socket;

use std::collections::BTreeMap;

use acorn_protocol::{FileDetail, FileSource, NotionFile, Tool};
use futures::future::BoxFuture;
use thiserror::Error;

pub use api::ApiClient;
pub use socket::{ReconnectPolicy, SessionSocket, SocketEvent, SocketSender};

/// Errors that can occur in connectors
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Channel closed")]
    ChannelClosed,
}

/// Source of script metadata for a run session.
pub trait ToolSource: Send + Sync {
    fn fetch_tool<'a>(&'a self, file: &'a str) -> BoxFuture<'a, Result<Tool, ConnectorError>>;
}

/// Knowledge-file endpoints used by the Notion import dialog.
pub trait KnowledgeSource: Send + Sync {
    fn notion_configured(&self) -> BoxFuture<'_, Result<bool, ConnectorError>>;

    fn notion_files(&self) -> BoxFuture<'_, Result<BTreeMap<String, NotionFile>, ConnectorError>>;

    fn sync_files<'a>(
        &'a self,
        ids: &'a [String],
        source: FileSource,
    ) -> BoxFuture<'a, Result<(), ConnectorError>>;

    fn import_files<'a>(
        &'a self,
        ids: &'a [String],
    ) -> BoxFuture<'a, Result<BTreeMap<String, FileDetail>, ConnectorError>>;
}

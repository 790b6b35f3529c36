//! Acorn Relay
//!
//! Client-side state for running scripts on an Acorn run server: the run
//! session actor and its transition function, the run form, transcript
//! rendering, knowledge-file import, and configuration.

pub mod config;
pub mod form;
pub mod knowledge;
pub mod notion;
pub mod render;
pub mod restart;
pub mod scripts;
pub mod session;
pub mod session_actor;
pub mod session_command;
pub mod transcript;
pub mod transition;

use std::path::PathBuf;

use acorn_connectors::ConnectorError;
use thiserror::Error;

pub use config::{CliOverrides, EnvOverrides, RelayConfig};
pub use form::{FormCollector, FormError};
pub use knowledge::KnowledgeFiles;
pub use notion::NotionImportDialog;
pub use session::RunSession;
pub use session_actor::SessionActorHandle;
pub use transcript::{Message, MessageKind, Transcript};
pub use transition::{Phase, SessionState, SessionUpdate, View};

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to read config file {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error(transparent)]
    Form(#[from] FormError),

    #[error(transparent)]
    Connector(#[from] ConnectorError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Session closed")]
    SessionClosed,
}

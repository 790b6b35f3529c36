//! Server → Client messages

use serde::{Deserialize, Serialize};

use crate::types::CallFrame;

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Execution frame for one tool invocation.
    Event { frame: CallFrame },

    /// Assistant text fragment.
    ScriptMessage {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sender_name: Option<String>,
    },

    /// Run failure reported by the engine.
    Error { message: String },
}

impl ServerMessage {
    /// Short frame name used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Event { .. } => "event",
            ServerMessage::ScriptMessage { .. } => "script_message",
            ServerMessage::Error { .. } => "error",
        }
    }
}

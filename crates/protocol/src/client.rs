//! Client → Server messages

use serde::{Deserialize, Serialize};

use crate::types::FormValues;

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Start a script run with the collected form arguments.
    Run {
        path: String,
        tool_name: String,
        #[serde(default)]
        form_values: FormValues,
        workspace_dir: String,
    },

    /// Chat input for a running chat script.
    UserMessage {
        text: String,
    },

    /// Ask the engine to stop the current generation. Never acknowledged.
    Interrupt,
}

impl ClientMessage {
    /// Short frame name used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Run { .. } => "run",
            ClientMessage::UserMessage { .. } => "user_message",
            ClientMessage::Interrupt => "interrupt",
        }
    }
}

//! Acorn Protocol
//!
//! Shared types for communication between the run server and Acorn clients.
//! Socket frames are serialized as JSON over WebSocket; the remaining types
//! are the JSON bodies of the HTTP endpoints.

use uuid::Uuid;

// Re-exports
pub mod client;
pub mod server;
pub mod types;

pub use client::ClientMessage;
pub use server::ServerMessage;
pub use types::*;

/// Generate a new unique ID
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

//! Core types shared across the protocol

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Argument name → value, as collected by the run form.
pub type FormValues = BTreeMap<String, String>;

/// Script file name → description, as returned by `GET /api/file`.
pub type ScriptListing = BTreeMap<String, String>;

// ---------------------------------------------------------------------------
// Execution frames
// ---------------------------------------------------------------------------

/// Frame type reported by the execution engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FrameKind {
    RunStart,
    RunFinish,
    CallStart,
    CallChat,
    CallConfirm,
    CallContinue,
    CallSubCalls,
    CallProgress,
    CallFinish,
    Prompt,
    #[serde(other)]
    Unknown,
}

/// Tool reference carried inside a frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameTool {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One output chunk of a call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameOutput {
    #[serde(default)]
    pub content: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Progress record for one tool invocation.
///
/// Only the fields the client acts on are typed; everything else the engine
/// sends is kept in `extra` and written back out unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallFrame {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: FrameKind,
    #[serde(rename = "parentID", default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<FrameTool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output: Vec<FrameOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CallFrame {
    pub fn new(id: impl Into<String>, kind: FrameKind) -> Self {
        Self {
            id: id.into(),
            kind,
            parent_id: None,
            tool: None,
            output: Vec::new(),
            error: None,
            extra: Map::new(),
        }
    }

    pub fn tool_name(&self) -> Option<&str> {
        self.tool
            .as_ref()
            .map(|t| t.name.as_str())
            .filter(|name| !name.is_empty())
    }

    /// Content of the most recent non-empty output chunk
    pub fn latest_output(&self) -> Option<&str> {
        self.output
            .iter()
            .rev()
            .map(|o| o.content.as_str())
            .find(|c| !c.is_empty())
    }

    /// True for the frame that closes the whole run, or the root call of a turn.
    pub fn ends_generation(&self) -> bool {
        match self.kind {
            FrameKind::RunFinish => true,
            FrameKind::CallFinish => self.parent_id.is_none(),
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Script metadata
// ---------------------------------------------------------------------------

/// One declared tool argument
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// Declared arguments of a tool
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolArguments {
    #[serde(default)]
    pub properties: BTreeMap<String, Property>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
}

/// Script entry tool, as returned by `GET /api/file/{name}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tool {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub instructions: String,
    #[serde(default)]
    pub chat: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<ToolArguments>,
}

impl Tool {
    /// Declared argument names in stable order
    pub fn argument_names(&self) -> Vec<String> {
        self.arguments
            .as_ref()
            .map(|args| args.properties.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn has_params(&self) -> bool {
        self.arguments
            .as_ref()
            .is_some_and(|args| !args.properties.is_empty())
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.arguments.as_ref()?.properties.get(name)
    }
}

// ---------------------------------------------------------------------------
// Knowledge files
// ---------------------------------------------------------------------------

/// Where a knowledge file came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileSource {
    Local,
    Notion,
}

impl FileSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileSource::Local => "local",
            FileSource::Notion => "notion",
        }
    }
}

/// A page available for import from Notion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotionFile {
    pub url: String,
    pub file_name: String,
}

/// Local file details returned by the import endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDetail {
    pub file_name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// Body of `POST /api/knowledge/sync`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRequest {
    pub files: Vec<String>,
    pub source: FileSource,
}

/// Body of `POST /api/knowledge/import`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRequest {
    pub files: Vec<String>,
}

/// Body of `GET /api/knowledge/notion/configured`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotionStatus {
    pub configured: bool,
}

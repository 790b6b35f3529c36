//! Script catalog built from `GET /api/file`.

use acorn_protocol::ScriptListing;
use serde::Serialize;

pub const NO_DESCRIPTION: &str = "No description provided";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptEntry {
    /// File name as the server knows it
    pub file: String,
    pub name: String,
    pub description: String,
}

pub fn display_name(file: &str) -> &str {
    file.strip_suffix(".gpt").unwrap_or(file)
}

pub fn catalog(listing: &ScriptListing) -> Vec<ScriptEntry> {
    listing
        .iter()
        .map(|(file, description)| {
            let description = description.trim();
            ScriptEntry {
                file: file.clone(),
                name: display_name(file).to_string(),
                description: if description.is_empty() {
                    NO_DESCRIPTION.to_string()
                } else {
                    description.to_string()
                },
            }
        })
        .collect()
}

//! Client-held knowledge file map
//!
//! Path → file details plus where the file came from. Persisted as a JSON
//! manifest so separate imports see each other's results.

use std::collections::BTreeMap;
use std::path::Path;

use acorn_protocol::{FileDetail, FileSource};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::RelayError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeFile {
    #[serde(flatten)]
    pub detail: FileDetail,
    pub source: FileSource,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KnowledgeFiles {
    files: BTreeMap<String, KnowledgeFile>,
}

impl KnowledgeFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&KnowledgeFile> {
        self.files.get(path)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.files.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &KnowledgeFile)> {
        self.files.iter()
    }

    pub fn insert(
        &mut self,
        path: impl Into<String>,
        detail: FileDetail,
        source: FileSource,
    ) -> Option<KnowledgeFile> {
        self.files
            .insert(path.into(), KnowledgeFile { detail, source })
    }

    pub fn remove(&mut self, path: &str) -> Option<KnowledgeFile> {
        self.files.remove(path)
    }

    /// Replace every entry from `source` with `imported`.
    ///
    /// Entries from other sources are never removed or overwritten; an
    /// imported path that collides with one is skipped. Returns the number
    /// of entries inserted.
    pub fn ensure_imported(
        &mut self,
        imported: BTreeMap<String, FileDetail>,
        source: FileSource,
    ) -> usize {
        self.files.retain(|_, file| file.source != source);

        let mut inserted = 0;
        for (path, detail) in imported {
            if self.files.contains_key(&path) {
                debug!(
                    component = "knowledge",
                    event = "knowledge.import.skipped",
                    path = %path,
                    source = source.as_str(),
                    "Path already held by another source"
                );
                continue;
            }
            self.files.insert(path, KnowledgeFile { detail, source });
            inserted += 1;
        }
        inserted
    }

    /// Load a manifest. A missing file is an empty map.
    pub fn load(path: &Path) -> Result<Self, RelayError> {
        match std::fs::read_to_string(path) {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), RelayError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

//! Notion import dialog state.

use std::collections::{BTreeMap, BTreeSet};

use acorn_connectors::{ConnectorError, KnowledgeSource};
use acorn_protocol::{FileSource, NotionFile};
use tracing::{info, warn};

use crate::knowledge::KnowledgeFiles;

/// Case-insensitive substring match on the file name only.
pub fn matches_search(file: &NotionFile, query: &str) -> bool {
    query.is_empty()
        || file
            .file_name
            .to_lowercase()
            .contains(&query.to_lowercase())
}

#[derive(Debug, Clone, Default)]
pub struct NotionImportDialog {
    configured: bool,
    files: BTreeMap<String, NotionFile>,
    selected: BTreeSet<String>,
    search: String,
    importing: bool,
    banner: Option<String>,
}

impl NotionImportDialog {
    /// Start with `selected` pre-checked (normally the current knowledge keys).
    pub fn new(selected: impl IntoIterator<Item = String>) -> Self {
        Self {
            selected: selected.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn is_configured(&self) -> bool {
        self.configured
    }

    pub fn is_importing(&self) -> bool {
        self.importing
    }

    pub fn banner(&self) -> Option<&str> {
        self.banner.as_deref()
    }

    pub fn dismiss_banner(&mut self) {
        self.banner = None;
    }

    pub fn files(&self) -> &BTreeMap<String, NotionFile> {
        &self.files
    }

    /// Check configuration, then fetch the remote file list if configured.
    pub async fn refresh(&mut self, source: &dyn KnowledgeSource) -> Result<(), ConnectorError> {
        let result = async {
            let configured = source.notion_configured().await?;
            let files = if configured {
                source.notion_files().await?
            } else {
                BTreeMap::new()
            };
            Ok::<_, ConnectorError>((configured, files))
        }
        .await;

        match result {
            Ok((configured, files)) => {
                self.configured = configured;
                self.files = files;
                Ok(())
            }
            Err(e) => {
                warn!(
                    component = "notion",
                    event = "notion.refresh_failed",
                    error = %e,
                    "Failed to load Notion files"
                );
                self.banner = Some(e.to_string());
                Err(e)
            }
        }
    }

    pub fn search(&self) -> &str {
        &self.search
    }

    pub fn set_search(&mut self, query: impl Into<String>) {
        self.search = query.into();
    }

    /// Rows passing the search filter, sorted by file name.
    pub fn visible(&self) -> Vec<(&str, &NotionFile)> {
        let mut rows: Vec<(&str, &NotionFile)> = self
            .files
            .iter()
            .filter(|(_, file)| matches_search(file, &self.search))
            .map(|(id, file)| (id.as_str(), file))
            .collect();
        rows.sort_by(|a, b| a.1.file_name.cmp(&b.1.file_name).then(a.0.cmp(b.0)));
        rows
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.selected.contains(id)
    }

    pub fn toggle(&mut self, id: &str) {
        if !self.selected.remove(id) {
            self.selected.insert(id.to_string());
        }
    }

    pub fn select(&mut self, ids: impl IntoIterator<Item = String>) {
        self.selected = ids.into_iter().collect();
    }

    /// Select every fetched file, regardless of the search filter.
    pub fn select_all(&mut self) {
        self.selected = self.files.keys().cloned().collect();
    }

    pub fn clear_selection(&mut self) {
        self.selected.clear();
    }

    pub fn selected(&self) -> Vec<String> {
        self.selected.iter().cloned().collect()
    }

    /// Sync then import the selection and merge it into `knowledge`.
    ///
    /// Errors land in the banner as well as the return value; `importing`
    /// is always reset.
    pub async fn import(
        &mut self,
        source: &dyn KnowledgeSource,
        knowledge: &mut KnowledgeFiles,
    ) -> Result<usize, ConnectorError> {
        let ids = self.selected();
        self.importing = true;
        self.banner = None;

        let result = async {
            source.sync_files(&ids, FileSource::Notion).await?;
            source.import_files(&ids).await
        }
        .await;
        self.importing = false;

        match result {
            Ok(imported) => {
                let inserted = knowledge.ensure_imported(imported, FileSource::Notion);
                info!(
                    component = "notion",
                    event = "notion.imported",
                    selected = ids.len(),
                    inserted,
                    "Imported Notion files"
                );
                Ok(inserted)
            }
            Err(e) => {
                warn!(
                    component = "notion",
                    event = "notion.import_failed",
                    selected = ids.len(),
                    error = %e,
                    "Notion import failed"
                );
                self.banner = Some(e.to_string());
                Err(e)
            }
        }
    }
}

//! `acorn notion ...` and `acorn knowledge`: Notion import and the local
//! knowledge manifest.

use acorn_connectors::{ApiClient, KnowledgeSource};
use acorn_relay::{KnowledgeFiles, NotionImportDialog, RelayConfig};
use anyhow::bail;
use clap::Subcommand;
use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{ContentArrangement, Table};
use serde_json::json;

#[derive(Subcommand)]
pub enum NotionCommands {
    /// Show whether the run server has Notion configured
    Status,
    /// List Notion pages available for import
    List {
        /// Case-insensitive filter on the page name
        #[arg(short, long)]
        search: Option<String>,
    },
    /// Import pages into the knowledge set (replaces earlier Notion imports)
    Import {
        /// Page ids to import
        ids: Vec<String>,
        /// Import every available page
        #[arg(long, conflicts_with = "ids")]
        all: bool,
    },
}

pub async fn run(
    cmd: NotionCommands,
    config: &RelayConfig,
    api: &ApiClient,
    json: bool,
) -> anyhow::Result<()> {
    match cmd {
        NotionCommands::Status => {
            let configured = api.notion_configured().await?;
            if json {
                println!("{}", json!({ "configured": configured }));
            } else {
                println!();
                println!(
                    "  Notion: {}",
                    if configured { "configured" } else { "not configured" }
                );
                println!();
            }
            Ok(())
        }
        NotionCommands::List { search } => {
            let mut dialog = NotionImportDialog::new(Vec::<String>::new());
            dialog.refresh(api).await?;
            ensure_configured(&dialog)?;
            if let Some(query) = search {
                dialog.set_search(query);
            }

            if json {
                let rows: Vec<_> = dialog
                    .visible()
                    .into_iter()
                    .map(|(id, file)| json!({ "id": id, "fileName": file.file_name, "url": file.url }))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&rows)?);
                return Ok(());
            }

            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL_CONDENSED)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["Name", "Id", "Link"]);
            for (id, file) in dialog.visible() {
                table.add_row(vec![file.file_name.as_str(), id, file.url.as_str()]);
            }
            println!("{table}");
            Ok(())
        }
        NotionCommands::Import { ids, all } => import(config, api, ids, all, json).await,
    }
}

async fn import(
    config: &RelayConfig,
    source: &dyn KnowledgeSource,
    ids: Vec<String>,
    all: bool,
    json: bool,
) -> anyhow::Result<()> {
    let manifest = config.knowledge_manifest_path();
    let mut knowledge = KnowledgeFiles::load(&manifest)?;

    let mut dialog = NotionImportDialog::new(knowledge.keys().cloned());
    dialog.refresh(source).await?;
    ensure_configured(&dialog)?;

    if all {
        dialog.select_all();
    } else if ids.is_empty() {
        bail!("nothing to import: pass page ids or --all");
    } else {
        dialog.select(ids);
    }

    if let Err(e) = dialog.import(source, &mut knowledge).await {
        bail!(
            "Notion import failed: {}",
            dialog.banner().map(str::to_string).unwrap_or_else(|| e.to_string())
        );
    }
    knowledge.save(&manifest)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&knowledge)?);
    } else {
        println!();
        println!(
            "  Imported {} Notion page(s); {} knowledge file(s) total",
            dialog.selected().len(),
            knowledge.len()
        );
        println!("  Manifest: {}", manifest.display());
        println!();
    }
    Ok(())
}

fn ensure_configured(dialog: &NotionImportDialog) -> anyhow::Result<()> {
    if !dialog.is_configured() {
        bail!("Notion is not configured on the run server");
    }
    Ok(())
}

/// `acorn knowledge`: show the knowledge manifest.
pub fn list_knowledge(config: &RelayConfig, json: bool) -> anyhow::Result<()> {
    let manifest = config.knowledge_manifest_path();
    let knowledge = KnowledgeFiles::load(&manifest)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&knowledge)?);
        return Ok(());
    }
    if knowledge.is_empty() {
        println!();
        println!("  No knowledge files ({})", manifest.display());
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Path", "Name", "Size", "Type", "Source"]);
    for (path, file) in knowledge.iter() {
        table.add_row(vec![
            path.clone(),
            file.detail.file_name.clone(),
            file.detail.size.to_string(),
            file.detail.kind.clone(),
            file.source.as_str().to_string(),
        ]);
    }
    println!("{table}");
    Ok(())
}

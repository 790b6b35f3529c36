//! `acorn scripts`: list scripts the run server offers.

use acorn_connectors::ApiClient;
use acorn_relay::scripts::{catalog, ScriptEntry};
use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{ContentArrangement, Table};

pub async fn run(api: &ApiClient, json: bool) -> anyhow::Result<()> {
    let listing = api.list_scripts().await?;
    let entries = catalog(&listing);

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!();
        println!("  No scripts found on {}", api.base_url());
        println!();
        return Ok(());
    }

    println!("{}", table(&entries));
    Ok(())
}

fn table(entries: &[ScriptEntry]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Script", "Description"]);
    for entry in entries {
        table.add_row(vec![entry.name.as_str(), entry.description.as_str()]);
    }
    table
}

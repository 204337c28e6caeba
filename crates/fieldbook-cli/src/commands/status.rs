use std::path::Path;

use fieldbook_core::db::StoreStatus;

use crate::commands::common::{format_sync_timestamp, open_store};
use crate::error::CliError;

pub async fn run_status(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path)?;
    let status = store.status().await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("Database: {}", db_path.display());
        for line in format_status_lines(&status) {
            println!("{line}");
        }
    }
    Ok(())
}

pub fn format_status_lines(status: &StoreStatus) -> Vec<String> {
    let last_pulled = status
        .last_pulled_at
        .map_or_else(|| "never".to_string(), format_sync_timestamp);

    let mut lines = vec![
        format!("Schema version: {}", status.schema_version),
        format!("Last pulled: {last_pulled}"),
    ];
    for collection in &status.collections {
        lines.push(format!(
            "  {:<15} {:>6} records  {:>4} pending",
            collection.collection, collection.records, collection.pending
        ));
    }
    lines.push(format!("Pending changes: {}", status.pending_total()));
    lines
}

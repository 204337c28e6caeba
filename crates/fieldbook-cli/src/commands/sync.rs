use std::path::Path;

use fieldbook_core::{HttpSyncEndpoint, SyncClientConfig, SyncEngine, SyncReport};

use crate::auth::KeychainCredentials;
use crate::commands::common::{
    format_sync_conflict_lines, open_store, sync_conflict_to_item, SyncConflictItem,
};
use crate::error::CliError;

pub async fn run_sync(config: &SyncClientConfig, db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path)?;
    let credentials = KeychainCredentials::new(&config.sync_url);
    let endpoint = HttpSyncEndpoint::new(config, credentials)?;
    let engine = SyncEngine::new(store, endpoint);

    match engine.try_sync().await {
        Ok(report) => {
            for line in format_sync_report(&report) {
                println!("{line}");
            }
            Ok(())
        }
        Err(fieldbook_core::Error::Auth(message)) => Err(CliError::Auth(format!(
            "{message}. Run `fieldbook auth login --token <TOKEN>` and retry."
        ))),
        Err(error) => Err(error.into()),
    }
}

pub fn format_sync_report(report: &SyncReport) -> Vec<String> {
    let mut lines = vec![
        format!(
            "Pulled {} changes ({} applied, {} deleted, {} kept local)",
            report.pulled, report.applied.applied, report.applied.deleted, report.applied.skipped
        ),
        format!("Pushed {} changes", report.pushed),
    ];
    if report.applied.conflicts > 0 {
        lines.push(format!(
            "Resolved {} conflicts (see `fieldbook conflicts`)",
            report.applied.conflicts
        ));
    }
    lines.push(format!("Sync completed, checkpoint {}", report.checkpoint));
    lines
}

pub async fn run_conflicts(limit: usize, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path)?;
    let conflicts = store.list_conflicts(limit).await?;

    if as_json {
        let json_items = conflicts
            .iter()
            .map(sync_conflict_to_item)
            .collect::<Vec<SyncConflictItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if conflicts.is_empty() {
        println!("No sync conflicts recorded.");
        return Ok(());
    }

    for line in format_sync_conflict_lines(&conflicts) {
        println!("{line}");
    }
    Ok(())
}

use std::path::Path;

use fieldbook_core::SyncClientConfig;

use crate::cli::ConfigCommands;
use crate::config::CliConfig;
use crate::error::CliError;

pub fn run_config(
    command: ConfigCommands,
    db_path: &Path,
    explicit_sync_url: Option<String>,
) -> Result<(), CliError> {
    match command {
        ConfigCommands::Set {
            sync_url,
            db_path: stored_db_path,
            request_timeout_secs,
        } => {
            let mut config = CliConfig::load()?;
            if let Some(url) = sync_url {
                // Validates scheme and normalizes the trailing slash.
                config.sync_url = Some(SyncClientConfig::new(url)?.sync_url);
            }
            if let Some(path) = stored_db_path {
                config.db_path = Some(path);
            }
            if let Some(secs) = request_timeout_secs {
                if secs == 0 {
                    return Err(CliError::Config(
                        "request_timeout_secs must be positive".to_string(),
                    ));
                }
                config.request_timeout_secs = Some(secs);
            }
            let path = config.save()?;
            println!("Saved config to {}", path.display());
        }
        ConfigCommands::Show => {
            let config = CliConfig::load()?;
            println!("Database: {}", db_path.display());
            match config.sync_client_config(explicit_sync_url) {
                Ok(sync) => {
                    println!("Sync endpoint: {}", sync.sync_endpoint());
                    println!("Request timeout: {}s", sync.request_timeout.as_secs());
                }
                Err(CliError::SyncNotConfigured) => println!("Sync endpoint: (not configured)"),
                Err(error) => return Err(error),
            }
        }
    }
    Ok(())
}

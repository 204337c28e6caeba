use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] fieldbook_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Customer name cannot be empty")]
    EmptyName,
    #[error("Record ID cannot be empty")]
    EmptyRecordId,
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Authentication error: {0}")]
    Auth(String),
    #[error(
        "Sync is not configured. Run `fieldbook config set --sync-url <URL>` or set FIELDBOOK_SYNC_URL."
    )]
    SyncNotConfigured,
}

//! Persistent CLI configuration.
//!
//! Values resolve in order: command-line flag, environment, config file,
//! built-in default.

use std::path::{Path, PathBuf};

use fieldbook_core::config::{
    SyncClientConfig, SyncClientConfigFile, SYNC_TIMEOUT_ENV, SYNC_URL_ENV,
};
use fieldbook_core::util::non_blank;
use serde::{Deserialize, Serialize};

use crate::error::CliError;

const CONFIG_FILE_NAME: &str = "cli-config.json";
pub const DB_PATH_ENV: &str = "FIELDBOOK_DB_PATH";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CliConfig {
    #[serde(default = "default_config_version")]
    pub version: u32,
    #[serde(default)]
    pub sync_url: Option<String>,
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

const fn default_config_version() -> u32 {
    1
}

pub fn default_config_path() -> Result<PathBuf, CliError> {
    dirs::config_dir()
        .map(|dir| dir.join("fieldbook").join(CONFIG_FILE_NAME))
        .ok_or_else(|| CliError::Config("Failed to resolve CLI config directory".to_string()))
}

pub fn default_db_path() -> Result<PathBuf, CliError> {
    dirs::data_dir()
        .map(|dir| dir.join("fieldbook").join("fieldbook.db"))
        .ok_or_else(|| CliError::Config("Failed to resolve CLI data directory".to_string()))
}

impl CliConfig {
    pub fn load() -> Result<Self, CliError> {
        Self::load_from_path(&default_config_path()?)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, CliError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(|error| {
            CliError::Config(format!(
                "Failed to read config at {}: {error}",
                path.display()
            ))
        })?;
        let mut config = serde_json::from_str::<Self>(&raw).map_err(|error| {
            CliError::Config(format!(
                "Failed to parse config at {}: {error}",
                path.display()
            ))
        })?;
        config.normalize();
        Ok(config)
    }

    pub fn save(&self) -> Result<PathBuf, CliError> {
        let path = default_config_path()?;
        self.save_to_path(&path)?;
        Ok(path)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), CliError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut normalized = self.clone();
        normalized.normalize();
        std::fs::write(path, serde_json::to_string_pretty(&normalized)?)?;
        Ok(())
    }

    pub fn resolve_db_path(&self, explicit: Option<PathBuf>) -> Result<PathBuf, CliError> {
        self.resolve_db_path_with(explicit, |key| std::env::var(key).ok())
    }

    pub fn resolve_db_path_with(
        &self,
        explicit: Option<PathBuf>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<PathBuf, CliError> {
        if let Some(path) = explicit {
            return Ok(path);
        }
        if let Some(path) = non_blank(lookup(DB_PATH_ENV)) {
            return Ok(PathBuf::from(path));
        }
        match &self.db_path {
            Some(path) => Ok(path.clone()),
            None => default_db_path(),
        }
    }

    /// Sync endpoint settings, or `SyncNotConfigured` when no URL is known
    pub fn sync_client_config(
        &self,
        explicit_url: Option<String>,
    ) -> Result<SyncClientConfig, CliError> {
        self.sync_client_config_with(explicit_url, |key| std::env::var(key).ok())
    }

    pub fn sync_client_config_with(
        &self,
        explicit_url: Option<String>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<SyncClientConfig, CliError> {
        let sync_url = non_blank(explicit_url)
            .or_else(|| non_blank(lookup(SYNC_URL_ENV)))
            .or_else(|| self.sync_url.clone());
        let request_timeout_secs = match non_blank(lookup(SYNC_TIMEOUT_ENV)) {
            Some(raw) => Some(raw.parse::<u64>().map_err(|_| {
                CliError::Config(format!(
                    "{SYNC_TIMEOUT_ENV} must be a whole number of seconds"
                ))
            })?),
            None => self.request_timeout_secs,
        };

        SyncClientConfig::from_file(SyncClientConfigFile {
            sync_url,
            request_timeout_secs,
        })?
        .ok_or(CliError::SyncNotConfigured)
    }

    fn normalize(&mut self) {
        self.sync_url = non_blank(self.sync_url.take())
            .map(|url| url.trim_end_matches('/').to_string());
        self.db_path = self
            .db_path
            .take()
            .filter(|path| !path.as_os_str().is_empty());
    }
}

//! Sync client configuration.
//!
//! Holds the remote sync endpoint and the request timeout policy. Values come
//! from the environment or a JSON document; credentials are never stored here.

use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util::non_blank;

pub const SYNC_URL_ENV: &str = "FIELDBOOK_SYNC_URL";
pub const SYNC_TIMEOUT_ENV: &str = "FIELDBOOK_SYNC_TIMEOUT_SECS";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Where and how the sync engine talks to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncClientConfig {
    /// Server base URL, without trailing slash
    pub sync_url: String,
    /// Timeout applied to every sync request
    pub request_timeout: Duration,
}

/// On-disk / over-the-wire shape of [`SyncClientConfig`]
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SyncClientConfigFile {
    #[serde(default)]
    pub sync_url: Option<String>,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

impl SyncClientConfig {
    pub fn new(sync_url: impl Into<String>) -> Result<Self> {
        let sync_url = normalize_sync_url(Some(sync_url.into()))?
            .ok_or_else(|| Error::InvalidInput("sync_url must not be empty".to_string()))?;
        Ok(Self {
            sync_url,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        })
    }

    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Read `FIELDBOOK_SYNC_URL` / `FIELDBOOK_SYNC_TIMEOUT_SECS`
    ///
    /// Returns `None` when no sync URL is configured.
    pub fn from_env() -> Result<Option<Self>> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Parse a JSON document; `None` when it names no sync URL
    pub fn from_json(payload: &str) -> Result<Option<Self>> {
        let file: SyncClientConfigFile = serde_json::from_str(payload)
            .map_err(|error| Error::InvalidInput(format!("invalid sync config JSON: {error}")))?;
        Self::from_file(file)
    }

    pub fn from_file(file: SyncClientConfigFile) -> Result<Option<Self>> {
        let Some(sync_url) = normalize_sync_url(file.sync_url)? else {
            return Ok(None);
        };
        let request_timeout = match file.request_timeout_secs {
            Some(0) => {
                return Err(Error::InvalidInput(
                    "request_timeout_secs must be positive".to_string(),
                ))
            }
            Some(secs) => Duration::from_secs(secs),
            None => Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        };
        Ok(Some(Self {
            sync_url,
            request_timeout,
        }))
    }

    /// The single sync endpoint, `<base>/sync`
    pub fn sync_endpoint(&self) -> String {
        format!("{}/sync", self.sync_url)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<Self>> {
        let request_timeout_secs = match non_blank(lookup(SYNC_TIMEOUT_ENV)) {
            Some(raw) => Some(raw.parse::<u64>().map_err(|_| {
                Error::InvalidInput(format!("{SYNC_TIMEOUT_ENV} must be a whole number of seconds"))
            })?),
            None => None,
        };
        Self::from_file(SyncClientConfigFile {
            sync_url: lookup(SYNC_URL_ENV),
            request_timeout_secs,
        })
    }
}

fn normalize_sync_url(raw: Option<String>) -> Result<Option<String>> {
    let Some(url) = non_blank(raw) else {
        return Ok(None);
    };
    let parsed = Url::parse(&url)
        .map_err(|error| Error::InvalidInput(format!("invalid sync_url {url}: {error}")))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(Error::InvalidInput(
            "sync_url must be an http:// or https:// address".to_string(),
        ));
    }
    Ok(Some(url.trim_end_matches('/').to_string()))
}

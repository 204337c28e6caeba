//! Sync bearer token persistence in the OS keychain.

#[cfg(test)]
use std::collections::HashMap;
#[cfg(test)]
use std::sync::{Mutex, OnceLock};

#[cfg(not(test))]
use keyring::Entry;

use fieldbook_core::util::non_blank;
use fieldbook_core::CredentialProvider;

pub const TOKEN_ENV: &str = "FIELDBOOK_TOKEN";

#[cfg(not(test))]
const KEYRING_SERVICE_NAME: &str = "fieldbook-cli";

/// Keychain slot holding the token for one sync server
#[derive(Debug, Clone)]
pub struct TokenStore {
    username: String,
}

impl TokenStore {
    pub fn new(sync_url: &str) -> Self {
        Self {
            username: format!("sync_token:{}", sync_url.trim_end_matches('/')),
        }
    }

    #[cfg(test)]
    fn test_store() -> &'static Mutex<HashMap<String, String>> {
        static STORE: OnceLock<Mutex<HashMap<String, String>>> = OnceLock::new();
        STORE.get_or_init(|| Mutex::new(HashMap::new()))
    }

    #[cfg(not(test))]
    fn entry(&self) -> Result<Entry, String> {
        Entry::new(KEYRING_SERVICE_NAME, &self.username).map_err(|error| error.to_string())
    }

    #[cfg(not(test))]
    pub fn load(&self) -> Result<Option<String>, String> {
        match self.entry()?.get_password() {
            Ok(token) => Ok(non_blank(Some(token))),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(error) => Err(error.to_string()),
        }
    }

    #[cfg(test)]
    pub fn load(&self) -> Result<Option<String>, String> {
        let guard = Self::test_store()
            .lock()
            .map_err(|error| error.to_string())?;
        Ok(non_blank(guard.get(&self.username).cloned()))
    }

    #[cfg(not(test))]
    pub fn save(&self, token: &str) -> Result<(), String> {
        self.entry()?
            .set_password(token)
            .map_err(|error| error.to_string())
    }

    #[cfg(test)]
    pub fn save(&self, token: &str) -> Result<(), String> {
        let mut guard = Self::test_store()
            .lock()
            .map_err(|error| error.to_string())?;
        guard.insert(self.username.clone(), token.to_string());
        Ok(())
    }

    #[cfg(not(test))]
    pub fn clear(&self) -> Result<(), String> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(error) => Err(error.to_string()),
        }
    }

    #[cfg(test)]
    pub fn clear(&self) -> Result<(), String> {
        let mut guard = Self::test_store()
            .lock()
            .map_err(|error| error.to_string())?;
        guard.remove(&self.username);
        Ok(())
    }
}

/// Token for sync requests: `FIELDBOOK_TOKEN` when set, else the keychain
#[derive(Debug, Clone)]
pub struct KeychainCredentials {
    store: TokenStore,
    env_token: Option<String>,
}

impl KeychainCredentials {
    pub fn new(sync_url: &str) -> Self {
        Self::with_env_token(sync_url, std::env::var(TOKEN_ENV).ok())
    }

    pub fn with_env_token(sync_url: &str, env_token: Option<String>) -> Self {
        Self {
            store: TokenStore::new(sync_url),
            env_token: non_blank(env_token),
        }
    }
}

impl CredentialProvider for KeychainCredentials {
    fn bearer_token(&self) -> fieldbook_core::Result<Option<String>> {
        if let Some(token) = &self.env_token {
            return Ok(Some(token.clone()));
        }
        self.store
            .load()
            .map_err(|error| keychain_error("read", &error))
    }

    fn revoke(&self) -> fieldbook_core::Result<()> {
        if self.env_token.is_some() {
            tracing::warn!("Server rejected the token from {TOKEN_ENV}");
            return Ok(());
        }
        self.store
            .clear()
            .map_err(|error| keychain_error("clear", &error))
    }
}

/// Keychain trouble is a local I/O failure, not a rejected credential
fn keychain_error(action: &str, error: &str) -> fieldbook_core::Error {
    fieldbook_core::Error::Io(std::io::Error::other(format!(
        "failed to {action} keychain: {error}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_scoped_per_server() {
        let work = TokenStore::new("https://work.example.com/");
        let home = TokenStore::new("https://home.example.com");
        work.save("work-token").unwrap();

        assert_eq!(work.load().unwrap().as_deref(), Some("work-token"));
        assert_eq!(home.load().unwrap(), None);

        work.clear().unwrap();
        assert_eq!(work.load().unwrap(), None);
    }

    #[test]
    fn revoke_clears_stored_token() {
        let url = "https://revoke.example.com";
        TokenStore::new(url).save("stale").unwrap();
        let credentials = KeychainCredentials::with_env_token(url, None);
        assert_eq!(credentials.bearer_token().unwrap().as_deref(), Some("stale"));

        credentials.revoke().unwrap();
        assert_eq!(credentials.bearer_token().unwrap(), None);
    }

    #[test]
    fn env_token_takes_precedence_and_survives_revoke() {
        let url = "https://env.example.com";
        TokenStore::new(url).save("stored").unwrap();
        let credentials = KeychainCredentials::with_env_token(url, Some(" from-env ".into()));

        assert_eq!(credentials.bearer_token().unwrap().as_deref(), Some("from-env"));
        credentials.revoke().unwrap();
        assert_eq!(TokenStore::new(url).load().unwrap().as_deref(), Some("stored"));
    }

    #[test]
    fn keychain_failures_are_not_auth_errors() {
        let error = keychain_error("read", "locked collection");
        assert_eq!(error.kind(), fieldbook_core::ErrorKind::Internal);
        assert!(error.to_string().contains("failed to read keychain: locked collection"));
    }
}

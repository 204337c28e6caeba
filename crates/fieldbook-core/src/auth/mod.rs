//! Bearer credentials attached to sync requests.
//!
//! Token storage belongs to the client; the core only asks for the current
//! token and tells the provider to drop it when the server rejects it.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::Result;
use crate::util::non_blank;

/// Source of the bearer token for sync requests
pub trait CredentialProvider: Send + Sync {
    /// Current token, `None` when signed out
    fn bearer_token(&self) -> Result<Option<String>>;

    /// Forget the stored token after the server refused it
    fn revoke(&self) -> Result<()>;
}

impl<T: CredentialProvider + ?Sized> CredentialProvider for Arc<T> {
    fn bearer_token(&self) -> Result<Option<String>> {
        (**self).bearer_token()
    }

    fn revoke(&self) -> Result<()> {
        (**self).revoke()
    }
}

/// In-memory token, revocable
#[derive(Default)]
pub struct StaticCredentials {
    token: Mutex<Option<String>>,
}

impl StaticCredentials {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(non_blank(Some(token.into()))),
        }
    }

    /// Credentials that never send a token
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn is_revoked(&self) -> bool {
        self.token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl CredentialProvider for StaticCredentials {
    fn bearer_token(&self) -> Result<Option<String>> {
        Ok(self
            .token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn revoke(&self) -> Result<()> {
        self.token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        Ok(())
    }
}

impl fmt::Debug for StaticCredentials {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("StaticCredentials")
            .field("token", &"[REDACTED]")
            .field("revoked", &self.is_revoked())
            .finish()
    }
}

//! Error types for fieldbook-core

use thiserror::Error;

/// Result type alias using fieldbook-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in fieldbook-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed record data at write time
    #[error("Validation error: {0}")]
    Validation(String),

    /// No live record with that id in the collection
    #[error("Record not found in {collection}: {id}")]
    NotFound { collection: String, id: String },

    /// The store could not serialize an overlapping transaction
    #[error("Concurrent write: {0}")]
    ConcurrentWrite(String),

    /// On-device schema is newer than this build understands
    #[error("Local schema version {stored} is newer than supported version {target}; update the app")]
    SchemaTooNew { stored: u32, target: u32 },

    /// Migration list or existing shape cannot be brought to the target
    #[error("Migration error: {0}")]
    Migration(String),

    /// Remote endpoint unreachable or timed out
    #[error("Network error: {0}")]
    Network(String),

    /// Remote endpoint failed or rejected the request
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Remote endpoint refused the credential (HTTP 401)
    #[error("Authentication required: {0}")]
    Auth(String),

    /// Remote says "create" for an id this device created independently
    #[error(
        "Sync invariant violated in {collection}: remote created {id} at {remote_created_at}, \
         but it was created locally at {local_created_at}"
    )]
    SyncConflictInvariant {
        collection: String,
        id: String,
        local_created_at: i64,
        remote_created_at: i64,
    },

    /// Another synchronization round is in flight
    #[error("A sync round is already in progress")]
    SyncInProgress,

    /// SQLite error
    #[error("Database error: {0}")]
    Database(rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration or input outside record data
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Coarse error category, for callers that branch on failure handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    ConcurrentWrite,
    SchemaTooNew,
    Network,
    Server,
    Auth,
    SyncConflictInvariant,
    Internal,
}

impl Error {
    /// Classify this error into its category.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::ConcurrentWrite(_) | Self::SyncInProgress => ErrorKind::ConcurrentWrite,
            Self::SchemaTooNew { .. } => ErrorKind::SchemaTooNew,
            Self::Network(_) => ErrorKind::Network,
            Self::Server { .. } => ErrorKind::Server,
            Self::Auth(_) => ErrorKind::Auth,
            Self::SyncConflictInvariant { .. } => ErrorKind::SyncConflictInvariant,
            Self::Migration(_)
            | Self::Database(_)
            | Self::Io(_)
            | Self::InvalidInput(_)
            | Self::Serialization(_) => ErrorKind::Internal,
        }
    }

    /// Whether retrying the same operation later can succeed without caller changes.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::ConcurrentWrite | ErrorKind::Network | ErrorKind::Server
        )
    }

    pub(crate) fn not_found(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            collection: collection.into(),
            id: id.into(),
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(error: rusqlite::Error) -> Self {
        match error {
            rusqlite::Error::SqliteFailure(ref failure, _)
                if matches!(
                    failure.code,
                    rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
                ) =>
            {
                Self::ConcurrentWrite(error.to_string())
            }
            other => Self::Database(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_sqlite_errors_map_to_concurrent_write() {
        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            Some("database is locked".to_string()),
        );
        let error = Error::from(busy);
        assert_eq!(error.kind(), ErrorKind::ConcurrentWrite);
        assert!(error.is_retryable());
    }

    #[test]
    fn other_sqlite_errors_stay_database_errors() {
        let error = Error::from(rusqlite::Error::QueryReturnedNoRows);
        assert!(matches!(error, Error::Database(_)));
        assert_eq!(error.kind(), ErrorKind::Internal);
        assert!(!error.is_retryable());
    }

    #[test]
    fn only_auth_errors_are_auth_kind() {
        assert_eq!(Error::Auth("expired".into()).kind(), ErrorKind::Auth);
        assert_eq!(
            Error::Server {
                status: 503,
                message: "down".into()
            }
            .kind(),
            ErrorKind::Server
        );
        assert_eq!(Error::Network("timeout".into()).kind(), ErrorKind::Network);
    }
}

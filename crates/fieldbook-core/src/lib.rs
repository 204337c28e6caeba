//! fieldbook-core - Core library for Fieldbook
//!
//! This crate contains the synchronized record models, the local SQLite
//! store with its schema migrations, and the engine that reconciles the
//! store with the remote sync server. Client apps and the CLI build on it.

pub mod auth;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod state;
pub mod sync;
pub mod util;

pub use auth::{CredentialProvider, StaticCredentials};
pub use config::SyncClientConfig;
pub use db::{LocalStore, Order, Query};
pub use error::{Error, ErrorKind, Result};
pub use models::{
    Collection, CustomerB2B, CustomerB2C, Record, RecordId, User, WorkApproval,
};
pub use state::SyncPhase;
pub use sync::{HttpSyncEndpoint, RemoteEndpoint, SyncEngine, SyncReport};

//! Bidirectional synchronization with the remote server

mod apply;
mod engine;
pub mod protocol;
mod remote;

pub use apply::{apply_changes, ApplyStats};
pub use engine::{SyncEngine, SyncReport};
pub use protocol::{
    ColumnAdditions, MigrationSyncChanges, PullRequest, PullResponse, PushRequest, SyncChanges,
    TableChanges,
};
pub use remote::{HttpSyncEndpoint, RemoteEndpoint};

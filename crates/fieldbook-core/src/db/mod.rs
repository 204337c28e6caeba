//! Database layer for Fieldbook

mod connection;
mod migrations;
mod query;
mod records;
mod schema;
mod store;
mod sync_state;
mod tracker;
mod txn;

pub use connection::Database;
pub use migrations::{
    app_migrations, changes_since, get_version, Migration, MigrationOutcome, MigrationStep,
    SchemaChanges,
};
pub use query::{FilterValue, Order, Query};
pub use schema::{
    app_schema, base_schema, AppSchema, ColumnSchema, ColumnType, TableSchema, CURRENT_VERSION,
};
pub use store::{CollectionStatus, LocalStore, StoreStatus};
pub use sync_state::{STRATEGY_LWW, STRATEGY_REMOTE_DELETE};
pub use txn::{RowStatus, StoreTxn};

pub(crate) use sync_state::ConflictEntry;
pub(crate) use txn::table_of;

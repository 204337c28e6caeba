use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use fieldbook_core::Collection;

#[derive(Parser)]
#[command(name = "fieldbook")]
#[command(about = "Inspect and synchronize the Fieldbook offline store")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Sync server base URL (overrides config and FIELDBOOK_SYNC_URL)
    #[arg(long, global = true, value_name = "URL")]
    pub sync_url: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Register a customer locally
    AddCustomer {
        /// Customer segment
        #[arg(long, value_enum)]
        kind: CustomerKind,
        /// Customer name
        #[arg(long)]
        name: String,
        /// Contact phone number
        #[arg(long)]
        phone: Option<String>,
        /// Contact email
        #[arg(long)]
        email: Option<String>,
        /// Owning team
        #[arg(long)]
        team: Option<String>,
    },
    /// List records of a collection, most recently updated first
    List {
        /// users, customers_b2b, customers_b2c or work_approvals
        collection: Collection,
        /// Number of records to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a record (pushed as a deletion on the next sync)
    Delete {
        /// users, customers_b2b, customers_b2c or work_approvals
        collection: Collection,
        /// Record ID
        id: String,
    },
    /// Run one sync round against the server
    Sync,
    /// Show schema version, checkpoint and pending changes
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List recently resolved sync conflicts
    Conflicts {
        /// Number of conflicts to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Configure the CLI
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Manage the sync bearer token
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CustomerKind {
    B2b,
    B2c,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Write values to the CLI config file
    Set {
        /// Sync server base URL
        #[arg(long, value_name = "URL")]
        sync_url: Option<String>,
        /// Local database file
        #[arg(long, value_name = "PATH")]
        db_path: Option<PathBuf>,
        /// Timeout for each sync request
        #[arg(long, value_name = "SECONDS")]
        request_timeout_secs: Option<u64>,
    },
    /// Print the effective configuration
    Show,
}

#[derive(Subcommand)]
pub enum AuthCommands {
    /// Store a bearer token for the sync server in the keychain
    Login {
        /// Bearer token issued by the server
        #[arg(long, value_name = "TOKEN")]
        token: String,
    },
    /// Show whether a token is stored
    Status,
    /// Remove the stored token
    Logout,
}

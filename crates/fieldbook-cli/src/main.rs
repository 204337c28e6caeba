//! Fieldbook CLI - inspect and synchronize the offline store from a terminal
//!
//! Useful for field support and for exercising a sync server by hand.

mod auth;
mod cli;
mod commands;
mod config;
mod error;


use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::commands::add::{run_add_customer, CustomerContact};
use crate::commands::auth_cmd::run_auth;
use crate::commands::config::run_config;
use crate::commands::delete::run_delete;
use crate::commands::list::run_list;
use crate::commands::status::run_status;
use crate::commands::sync::{run_conflicts, run_sync};
use crate::config::CliConfig;
use crate::error::CliError;

const DEFAULT_LOG_FILTER: &str = "fieldbook=info";

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = CliConfig::load()?;
    let db_path = config.resolve_db_path(cli.db_path)?;

    match cli.command {
        Commands::AddCustomer {
            kind,
            name,
            phone,
            email,
            team,
        } => {
            let contact = CustomerContact { phone, email, team };
            run_add_customer(kind, &name, contact, &db_path).await?;
        }
        Commands::List {
            collection,
            limit,
            json,
        } => run_list(collection, limit, json, &db_path).await?,
        Commands::Delete { collection, id } => run_delete(collection, &id, &db_path).await?,
        Commands::Sync => {
            let sync_config = config.sync_client_config(cli.sync_url)?;
            run_sync(&sync_config, &db_path).await?;
        }
        Commands::Status { json } => run_status(json, &db_path).await?,
        Commands::Conflicts { limit, json } => run_conflicts(limit, json, &db_path).await?,
        Commands::Auth { command } => {
            let sync_config = config.sync_client_config(cli.sync_url)?;
            run_auth(command, &sync_config.sync_url)?;
        }
        Commands::Config { command } => run_config(command, &db_path, cli.sync_url)?,
    }

    Ok(())
}

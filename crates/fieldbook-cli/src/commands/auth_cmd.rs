use fieldbook_core::util::non_blank;

use crate::auth::{TokenStore, TOKEN_ENV};
use crate::cli::AuthCommands;
use crate::error::CliError;

pub fn run_auth(command: AuthCommands, sync_url: &str) -> Result<(), CliError> {
    let store = TokenStore::new(sync_url);
    match command {
        AuthCommands::Login { token } => {
            let token = non_blank(Some(token))
                .ok_or_else(|| CliError::Auth("Token cannot be empty".to_string()))?;
            store.save(&token).map_err(CliError::Auth)?;
            println!("Stored sync token for {sync_url}");
        }
        AuthCommands::Status => {
            if non_blank(std::env::var(TOKEN_ENV).ok()).is_some() {
                println!("Using token from {TOKEN_ENV}");
            } else if store.load().map_err(CliError::Auth)?.is_some() {
                println!("Signed in to {sync_url}");
            } else {
                println!("Not signed in to {sync_url}");
            }
        }
        AuthCommands::Logout => {
            store.clear().map_err(CliError::Auth)?;
            println!("Signed out of {sync_url}");
        }
    }
    Ok(())
}

use std::path::Path;

use fieldbook_core::util::non_blank;
use fieldbook_core::{CustomerB2B, CustomerB2C};

use crate::cli::CustomerKind;
use crate::commands::common::open_store;
use crate::error::CliError;

/// Optional contact fields shared by both customer kinds
#[derive(Debug, Default)]
pub struct CustomerContact {
    pub phone: Option<String>,
    pub email: Option<String>,
    pub team: Option<String>,
}

pub async fn run_add_customer(
    kind: CustomerKind,
    name: &str,
    contact: CustomerContact,
    db_path: &Path,
) -> Result<(), CliError> {
    let name = non_blank(Some(name.to_string())).ok_or(CliError::EmptyName)?;
    let phone = non_blank(contact.phone);
    let email = non_blank(contact.email);
    let team = non_blank(contact.team);

    let store = open_store(db_path)?;
    let id = match kind {
        CustomerKind::B2b => {
            store
                .create(CustomerB2B {
                    name,
                    phone,
                    email,
                    team,
                    ..CustomerB2B::default()
                })
                .await?
                .id
        }
        CustomerKind::B2c => {
            store
                .create(CustomerB2C {
                    name,
                    phone,
                    email,
                    team,
                    ..CustomerB2C::default()
                })
                .await?
                .id
        }
    };

    println!("{id}");
    Ok(())
}

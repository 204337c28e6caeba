use std::path::Path;

use fieldbook_core::Collection;

use crate::commands::common::{normalize_record_id, open_store};
use crate::error::CliError;

pub async fn run_delete(collection: Collection, id: &str, db_path: &Path) -> Result<(), CliError> {
    let id = normalize_record_id(id)?;
    let store = open_store(db_path)?;

    store.mark_deleted(collection, &id).await?;
    println!("{id}");
    Ok(())
}

use std::path::Path;

use fieldbook_core::Collection;

use crate::commands::common::{format_record_lines, list_records, open_store};
use crate::error::CliError;

pub async fn run_list(
    collection: Collection,
    limit: usize,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let store = open_store(db_path)?;
    let items = list_records(&store, collection, limit).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else if items.is_empty() {
        println!("No {collection} records.");
    } else {
        for line in format_record_lines(&items) {
            println!("{line}");
        }
    }

    Ok(())
}

use notegrid_core::{GridPreferences, ReadSource};
use serde::Serialize;

use crate::cli::GlobalArgs;
use crate::commands::common::{
    format_item_lines, list_items, normalize_database_ref, GridContext, GridListItem,
};
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct ShowOutput {
    source: ReadSource,
    content_hash: String,
    last_modified: String,
    preferences: GridPreferences,
    total: usize,
    items: Vec<GridListItem>,
}

pub async fn run_show(
    database: &str,
    limit: Option<usize>,
    as_json: bool,
    global: &GlobalArgs,
) -> Result<(), CliError> {
    let database_ref = normalize_database_ref(database)?;
    let context = GridContext::open(global).await?;
    let read = context
        .store
        .read(context.identity.as_ref(), &database_ref)
        .await;

    let collection = &read.collection;
    let items = match limit {
        Some(limit) => &collection.items[..limit.min(collection.items.len())],
        None => collection.visible_items(),
    };

    if as_json {
        let output = ShowOutput {
            source: read.source,
            content_hash: collection.content_hash.clone(),
            last_modified: collection.last_modified.clone(),
            preferences: collection.preferences.clone(),
            total: collection.items.len(),
            items: list_items(items),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!(
        "{database_ref} from {} store: {} of {} items, hash {}",
        read.source,
        items.len(),
        collection.items.len(),
        collection.content_hash
    );
    if read.is_fallback() {
        println!("Nothing stored yet; showing the demo grid. Run `notegrid sync {database_ref}`.");
    }
    for line in format_item_lines(items) {
        println!("{line}");
    }
    Ok(())
}

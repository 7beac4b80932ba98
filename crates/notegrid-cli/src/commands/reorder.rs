use crate::cli::GlobalArgs;
use crate::commands::common::{
    format_item_lines, normalize_database_ref, reconnect_hint, GridContext,
};
use crate::error::CliError;

pub async fn run_reorder(
    database: &str,
    ids: &[String],
    as_json: bool,
    global: &GlobalArgs,
) -> Result<(), CliError> {
    let database_ref = normalize_database_ref(database)?;
    let ordered_ids = normalize_ids(ids)?;
    let context = GridContext::open(global).await?;
    let coordinator = context.coordinator()?;

    let outcome = coordinator
        .reorder(&database_ref, &ordered_ids)
        .await
        .map_err(|error| reconnect_hint(&database_ref, error))?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    for line in format_item_lines(&outcome.items) {
        println!("{line}");
    }
    println!(
        "Mirrored {}/{} positions to Notion",
        outcome.mirror.updated, outcome.mirror.total
    );
    for failed in outcome.mirror.results.iter().filter(|result| !result.success) {
        eprintln!(
            "Warning: could not set position {} on {}: {}",
            failed.position,
            failed.id,
            failed.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

pub fn normalize_ids(ids: &[String]) -> Result<Vec<String>, CliError> {
    let ids: Vec<String> = ids
        .iter()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .collect();
    if ids.is_empty() {
        return Err(CliError::EmptyOrder);
    }
    Ok(ids)
}

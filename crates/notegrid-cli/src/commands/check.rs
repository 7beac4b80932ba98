use crate::cli::GlobalArgs;
use crate::commands::common::{normalize_database_ref, reconnect_hint, GridContext};
use crate::error::CliError;

pub async fn run_check(
    database: &str,
    last_hash: Option<&str>,
    as_json: bool,
    global: &GlobalArgs,
) -> Result<(), CliError> {
    let database_ref = normalize_database_ref(database)?;
    let last_hash = last_hash.map(str::trim).filter(|hash| !hash.is_empty());
    let context = GridContext::open(global).await?;
    let coordinator = context.coordinator()?;

    let check = coordinator
        .check_for_changes(&database_ref, last_hash)
        .await
        .map_err(|error| reconnect_hint(&database_ref, error))?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&check)?);
        return Ok(());
    }

    match last_hash {
        None => println!(
            "Current hash {} ({} items)",
            check.current_hash, check.change_count
        ),
        Some(_) if check.has_changes => println!(
            "Changed: now {} ({} items)",
            check.current_hash, check.change_count
        ),
        Some(_) => println!("No changes ({} items)", check.change_count),
    }
    Ok(())
}

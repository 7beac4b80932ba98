use notegrid_core::{ContentSource, DatabaseSummary, FetchError, SyncSettings};

use crate::cli::GlobalArgs;
use crate::commands::common::{notion_client, truncate};
use crate::error::CliError;

pub async fn run_databases(as_json: bool, global: &GlobalArgs) -> Result<(), CliError> {
    let settings = SyncSettings::from_env()?;
    let client = notion_client(global.notion_token.as_deref(), &settings)?;

    let databases = client.list_databases().await.map_err(|error| match error {
        FetchError::Auth(_) => CliError::ReconnectRequired("the integration".to_string()),
        other => other.into(),
    })?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&databases)?);
        return Ok(());
    }
    if databases.is_empty() {
        println!("No databases are shared with this integration.");
        return Ok(());
    }
    for line in format_database_lines(&databases) {
        println!("{line}");
    }
    Ok(())
}

pub fn format_database_lines(databases: &[DatabaseSummary]) -> Vec<String> {
    databases
        .iter()
        .map(|database| format!("{:<36}  {}", database.id, truncate(&database.title, 60)))
        .collect()
}

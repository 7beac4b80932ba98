use notegrid_core::{ContentItem, ReadSource, SyncError};
use serde::Serialize;

use crate::cli::GlobalArgs;
use crate::commands::common::{
    format_item_lines, normalize_database_ref, reconnect_hint, GridContext,
};
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct FallbackOutput<'a> {
    origin: ReadSource,
    warning: String,
    items: &'a [ContentItem],
}

pub async fn run_sync(database: &str, as_json: bool, global: &GlobalArgs) -> Result<(), CliError> {
    let database_ref = normalize_database_ref(database)?;
    let context = GridContext::open(global).await?;
    let coordinator = context.coordinator()?;

    match coordinator.run_sync(&database_ref).await {
        Ok(outcome) => {
            if as_json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
                return Ok(());
            }

            println!(
                "Synced {} items ({:?}, hash {})",
                outcome.items.len(),
                outcome.status,
                outcome.content_hash
            );
            for line in format_item_lines(&outcome.items) {
                println!("{line}");
            }
            if let Some(report) = &outcome.write_report {
                for failure in report.failures() {
                    eprintln!(
                        "Warning: {} store not updated: {}",
                        failure.tier,
                        failure.error.as_deref().unwrap_or("unknown error")
                    );
                }
            }
            Ok(())
        }
        Err(SyncError::Fetch(error)) if !error.is_reconnect_required() => {
            let fallback = context
                .store
                .read(context.identity.as_ref(), &database_ref)
                .await;
            let warning = format!("Sync failed ({error}); showing last known data");

            if as_json {
                let output = FallbackOutput {
                    origin: fallback.source,
                    warning,
                    items: &fallback.collection.items,
                };
                println!("{}", serde_json::to_string_pretty(&output)?);
                return Ok(());
            }

            eprintln!("Warning: {warning} from {} store", fallback.source);
            for line in format_item_lines(&fallback.collection.items) {
                println!("{line}");
            }
            Ok(())
        }
        Err(error) => Err(reconnect_hint(&database_ref, error)),
    }
}

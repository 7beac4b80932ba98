use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use notegrid_core::sync::SchedulerExit;
use notegrid_core::{GridPreferences, SyncEvent, SyncScheduler};
use tokio::sync::broadcast::error::RecvError;

use crate::cli::GlobalArgs;
use crate::commands::common::{normalize_database_ref, GridContext};
use crate::error::CliError;

const MIN_INTERVAL_SECS: u64 = 30;

pub async fn run_watch(
    database: &str,
    interval_secs: Option<u64>,
    global: &GlobalArgs,
) -> Result<(), CliError> {
    let database_ref = normalize_database_ref(database)?;
    let interval = resolve_interval(interval_secs)?;
    let context = GridContext::open(global).await?;
    let stored = context
        .store
        .read_existing(context.identity.as_ref(), &database_ref)
        .await
        .map(|read| read.collection.preferences);
    let plan = plan_watch(stored.as_ref(), interval);
    if plan == WatchPlan::Disabled {
        println!(
            "Auto sync is off for {database_ref}. Pass --interval to watch it anyway."
        );
        return Ok(());
    }

    let coordinator = Arc::new(context.coordinator()?);
    let mut events = coordinator.subscribe();
    let scheduler = SyncScheduler::new(coordinator, &database_ref);
    let handle = match plan {
        WatchPlan::Every(interval) => scheduler.with_interval(interval).with_auto_sync(true),
        WatchPlan::Stored(preferences) => scheduler.with_preferences(&preferences),
        WatchPlan::Settings | WatchPlan::Disabled => scheduler.with_auto_sync(true),
    }
    .start();
    println!("Watching {database_ref}. Press Ctrl-C to stop.");

    let exit = loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                println!("Stopping after the current cycle...");
                break handle.stop().await;
            }
            event = events.recv() => match event {
                Ok(SyncEvent::ReconnectRequired { .. }) => break handle.wait().await,
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Missed sync events");
                }
                Err(RecvError::Closed) => break handle.wait().await,
            },
        }
    };

    match exit {
        SchedulerExit::Stopped => Ok(()),
        SchedulerExit::ReconnectRequired => Err(CliError::ReconnectRequired(database_ref)),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum WatchPlan {
    /// `--interval` was given; it wins over stored preferences.
    Every(Duration),
    Stored(GridPreferences),
    /// Nothing stored yet: use the environment's interval.
    Settings,
    Disabled,
}

fn plan_watch(stored: Option<&GridPreferences>, interval: Option<Duration>) -> WatchPlan {
    match (interval, stored) {
        (Some(interval), _) => WatchPlan::Every(interval),
        (None, Some(preferences)) if !preferences.auto_sync => WatchPlan::Disabled,
        (None, Some(preferences)) => WatchPlan::Stored(preferences.clone()),
        (None, None) => WatchPlan::Settings,
    }
}

fn resolve_interval(interval_secs: Option<u64>) -> Result<Option<Duration>, CliError> {
    match interval_secs {
        Some(secs) if secs < MIN_INTERVAL_SECS => Err(CliError::Config(format!(
            "--interval must be at least {MIN_INTERVAL_SECS} seconds"
        ))),
        Some(secs) => Ok(Some(Duration::from_secs(secs))),
        None => Ok(None),
    }
}

fn print_event(event: &SyncEvent) {
    let now = Local::now().format("%H:%M:%S");
    match event {
        SyncEvent::ContentChanged {
            items,
            content_hash,
            ..
        } => println!("[{now}] Synced {items} items (hash {content_hash})"),
        SyncEvent::Unchanged { .. } => println!("[{now}] No changes"),
        SyncEvent::Reordered { content_hash, .. } => {
            println!("[{now}] Order updated (hash {content_hash})");
        }
        SyncEvent::FetchFailed { error, .. } => {
            eprintln!("[{now}] Sync failed: {error}. Keeping the last stored grid.");
        }
        SyncEvent::ReconnectRequired { .. } => {}
    }
}

//! Notegrid CLI - mirror a Notion database as an ordered image grid
//!
//! Sync, watch, inspect and reorder grids from the terminal.

mod cli;
mod commands;
mod error;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::check::run_check;
use crate::commands::completions::run_completions;
use crate::commands::databases::run_databases;
use crate::commands::reorder::run_reorder;
use crate::commands::show::run_show;
use crate::commands::sync::run_sync;
use crate::commands::watch::run_watch;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let filter = EnvFilter::from_default_env().add_directive(
        "notegrid=info"
            .parse()
            .map_err(|error| CliError::Config(format!("invalid log directive: {error}")))?,
    );
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let global = &cli.global;

    match cli.command {
        Commands::Sync { database, json } => run_sync(&database, json, global).await,
        Commands::Watch { database, interval } => run_watch(&database, interval, global).await,
        Commands::Check {
            database,
            last_hash,
            json,
        } => run_check(&database, last_hash.as_deref(), json, global).await,
        Commands::Show {
            database,
            limit,
            json,
        } => run_show(&database, limit, json, global).await,
        Commands::Reorder {
            database,
            ids,
            json,
        } => run_reorder(&database, &ids, json, global).await,
        Commands::Databases { json } => run_databases(json, global).await,
        Commands::Completions { shell, output } => run_completions(shell, output.as_deref()),
    }
}

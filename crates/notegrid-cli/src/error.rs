use std::io;

use notegrid_core::{FetchError, SettingsError, StoreError, SyncError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Database id cannot be empty")]
    EmptyDatabaseRef,
    #[error("Provide at least one record id to reorder")]
    EmptyOrder,
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Notion token is missing. Pass --notion-token or set NOTION_TOKEN.")]
    MissingNotionToken,
    #[error("Notion rejected the token for {0}. Create a new integration token and retry.")]
    ReconnectRequired(String),
}

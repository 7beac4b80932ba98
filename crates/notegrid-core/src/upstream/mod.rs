//! The upstream content source: a Notion database.

#[cfg(any(test, feature = "test-util"))]
mod memory;
mod notion;

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::normalize::RawRecord;

#[cfg(any(test, feature = "test-util"))]
pub use memory::{notion_page, InMemorySource};
pub use notion::{NotionClient, NOTION_VERSION, ORDER_PROPERTY};

/// Failure talking to the upstream source.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("Upstream request failed: {0}")]
    Transient(String),
    #[error("Upstream request timed out after {0:?}")]
    Timeout(Duration),
    #[error("Upstream authorization failed, reconnect required: {0}")]
    Auth(String),
    #[error("Upstream rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("Upstream response could not be decoded: {0}")]
    Decode(String),
}

impl FetchError {
    /// The credential is missing, expired or revoked; retrying will not help.
    pub const fn is_reconnect_required(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}

/// A database the credential can read, for choosing a `database_ref`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseSummary {
    pub id: String,
    pub title: String,
}

/// Read and order-mirroring access to an upstream database.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// First page of records in `database_ref`.
    async fn query_database(&self, database_ref: &str) -> Result<Vec<RawRecord>, FetchError>;

    /// Record a 1-based display position on an upstream record.
    async fn update_record_order(&self, record_id: &str, position: u32)
        -> Result<(), FetchError>;

    /// Databases shared with the credential.
    async fn list_databases(&self) -> Result<Vec<DatabaseSummary>, FetchError>;
}

//! Layered grid persistence.
//!
//! Grids live in up to three tiers: the user's authoritative rows, a shared
//! public copy for embeds, and a local cache. Reads fall through the tiers
//! in that order and end at the built-in demo grid; writes fan out to every
//! applicable tier independently.

mod cache;
pub mod demo;
mod layered;
mod memory;
mod supabase;

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::identity::Identity;
use crate::models::OrderedCollection;

pub use cache::LibSqlGridCache;
pub use layered::LayeredStore;
pub use memory::MemoryGridStore;
pub use supabase::{SupabaseGridStore, SupabaseTable};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("An authenticated identity is required for this store")]
    IdentityRequired,
    #[error("Store database error: {0}")]
    Database(String),
    #[error("Store HTTP request failed: {0}")]
    Http(String),
    #[error("Store API error: {0}")]
    Api(String),
    #[error("Stored grid payload is invalid: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<crate::Error> for StoreError {
    fn from(error: crate::Error) -> Self {
        Self::Database(error.to_string())
    }
}

impl From<libsql::Error> for StoreError {
    fn from(error: libsql::Error) -> Self {
        Self::Database(error.to_string())
    }
}

/// Persistence tier, ordered by read precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreTier {
    Authoritative,
    Shared,
    Cache,
}

impl StoreTier {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Authoritative => "authoritative",
            Self::Shared => "shared",
            Self::Cache => "cache",
        }
    }
}

impl fmt::Display for StoreTier {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Where a read was ultimately served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadSource {
    Authoritative,
    Shared,
    Cache,
    Demo,
}

impl ReadSource {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Authoritative => "authoritative",
            Self::Shared => "shared",
            Self::Cache => "cache",
            Self::Demo => "demo",
        }
    }
}

impl From<StoreTier> for ReadSource {
    fn from(tier: StoreTier) -> Self {
        match tier {
            StoreTier::Authoritative => Self::Authoritative,
            StoreTier::Shared => Self::Shared,
            StoreTier::Cache => Self::Cache,
        }
    }
}

impl fmt::Display for ReadSource {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Address of one grid: the upstream database plus, optionally, its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreKey {
    pub identity: Option<Identity>,
    pub database_ref: String,
}

impl StoreKey {
    pub fn new(identity: Option<Identity>, database_ref: impl Into<String>) -> Self {
        Self {
            identity,
            database_ref: database_ref.into(),
        }
    }

    pub fn public(database_ref: impl Into<String>) -> Self {
        Self::new(None, database_ref)
    }

    pub fn user_id(&self) -> Option<&str> {
        self.identity
            .as_ref()
            .map(|identity| identity.user_id.as_str())
    }
}

/// A single persistence tier.
#[async_trait]
pub trait GridStore: Send + Sync {
    /// Label used in logs.
    fn name(&self) -> &'static str;

    async fn get(&self, key: &StoreKey) -> Result<Option<OrderedCollection>, StoreError>;

    async fn put(&self, key: &StoreKey, collection: &OrderedCollection) -> Result<(), StoreError>;
}

/// Result of a layered read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreRead {
    pub collection: OrderedCollection,
    pub source: ReadSource,
}

impl StoreRead {
    pub const fn is_fallback(&self) -> bool {
        matches!(self.source, ReadSource::Demo)
    }
}

/// Outcome of writing to one tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierWrite {
    pub tier: StoreTier,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-tier outcomes of a layered write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WriteReport {
    pub tiers: Vec<TierWrite>,
}

impl WriteReport {
    pub fn all_succeeded(&self) -> bool {
        self.tiers.iter().all(|write| write.error.is_none())
    }

    pub fn succeeded(&self, tier: StoreTier) -> bool {
        self.tiers
            .iter()
            .any(|write| write.tier == tier && write.error.is_none())
    }

    pub fn failures(&self) -> impl Iterator<Item = &TierWrite> {
        self.tiers.iter().filter(|write| write.error.is_some())
    }
}

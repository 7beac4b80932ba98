//! Polling synchronization between the upstream database and the grid stores.
//!
//! A [`SyncCoordinator`] runs single cycles (fetch, hash, reconcile, persist)
//! and reorders; a [`SyncScheduler`] drives one coordinator on a timer for one
//! database.

mod coordinator;
mod registry;
mod scheduler;

use serde::Serialize;
use thiserror::Error;

use crate::models::ContentItem;
use crate::store::{ReadSource, WriteReport};
use crate::upstream::FetchError;

pub use coordinator::SyncCoordinator;
pub use registry::{CycleGuard, SyncRegistry};
pub use scheduler::{SchedulerExit, SchedulerHandle, SyncScheduler, SyncStatus};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("A sync cycle for {0} is already running")]
    CycleInProgress(String),
    #[error("No grid items available for {0}")]
    EmptyGrid(String),
}

impl SyncError {
    pub const fn is_reconnect_required(&self) -> bool {
        matches!(self, Self::Fetch(error) if error.is_reconnect_required())
    }
}

/// Where a sync cycle currently is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    #[default]
    Idle,
    Fetching,
    Hashing,
    Reconciling,
    Persisting,
}

/// Whether a cycle found new upstream content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStatus {
    Changed,
    Unchanged,
}

/// Result of a sync cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOutcome {
    pub items: Vec<ContentItem>,
    /// Fingerprint of `items` in display order.
    pub content_hash: String,
    /// Fingerprint of the upstream snapshot, comparable with [`ChangeCheck::current_hash`].
    pub upstream_hash: String,
    pub status: CycleStatus,
    /// Tier the items were served from when nothing changed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<ReadSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_report: Option<WriteReport>,
}

/// Answer to "has upstream changed since this hash?".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeCheck {
    pub has_changes: bool,
    pub current_hash: String,
    pub change_count: usize,
    #[serde(rename = "lastSync")]
    pub checked_at: String,
}

/// Per-record outcome of mirroring the custom order upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MirrorResult {
    pub id: String,
    pub position: u32,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MirrorReport {
    pub updated: usize,
    pub total: usize,
    pub results: Vec<MirrorResult>,
}

impl MirrorReport {
    pub const fn is_complete(&self) -> bool {
        self.updated == self.total
    }
}

/// Result of applying a custom order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderOutcome {
    pub items: Vec<ContentItem>,
    pub content_hash: String,
    pub write_report: WriteReport,
    pub mirror: MirrorReport,
}

/// Notifications published by a coordinator after each cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    ContentChanged {
        database_ref: String,
        content_hash: String,
        items: usize,
    },
    Unchanged {
        database_ref: String,
        content_hash: String,
    },
    Reordered {
        database_ref: String,
        content_hash: String,
    },
    FetchFailed {
        database_ref: String,
        error: String,
    },
    ReconnectRequired {
        database_ref: String,
    },
}

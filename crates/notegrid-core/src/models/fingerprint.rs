//! Per-database change tracking

use serde::Serialize;

/// What a coordinator remembers about one upstream database between cycles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncFingerprint {
    pub database_ref: String,
    /// Absent until the first successful cycle.
    pub last_known_hash: Option<String>,
    pub last_sync_time: Option<String>,
}

impl SyncFingerprint {
    pub fn new(database_ref: impl Into<String>) -> Self {
        Self {
            database_ref: database_ref.into(),
            ..Self::default()
        }
    }

    pub fn matches(&self, hash: &str) -> bool {
        self.last_known_hash.as_deref() == Some(hash)
    }
}

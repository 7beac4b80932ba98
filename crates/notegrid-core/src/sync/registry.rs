use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{SyncError, SyncPhase};
use crate::models::SyncFingerprint;
use crate::util::rfc3339_now;

#[derive(Debug, Default)]
struct DatabaseState {
    fingerprint: SyncFingerprint,
    phase: SyncPhase,
}

/// Fingerprints and in-flight cycles, per database.
///
/// Share one registry between coordinators that must not run overlapping
/// cycles for the same database.
#[derive(Debug, Default)]
pub struct SyncRegistry {
    databases: Mutex<HashMap<String, DatabaseState>>,
}

impl SyncRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Claim `database_ref` for one cycle starting in `phase`.
    ///
    /// Fails with [`SyncError::CycleInProgress`] while another guard is alive.
    pub fn try_begin(
        self: &Arc<Self>,
        database_ref: &str,
        phase: SyncPhase,
    ) -> Result<CycleGuard, SyncError> {
        let mut databases = self.lock();
        let state = databases
            .entry(database_ref.to_string())
            .or_insert_with(|| DatabaseState {
                fingerprint: SyncFingerprint::new(database_ref),
                phase: SyncPhase::Idle,
            });
        if state.phase != SyncPhase::Idle {
            return Err(SyncError::CycleInProgress(database_ref.to_string()));
        }
        state.phase = phase;

        Ok(CycleGuard {
            registry: Arc::clone(self),
            database_ref: database_ref.to_string(),
        })
    }

    pub fn fingerprint(&self, database_ref: &str) -> SyncFingerprint {
        self.lock()
            .get(database_ref)
            .map_or_else(|| SyncFingerprint::new(database_ref), |state| state.fingerprint.clone())
    }

    pub fn phase(&self, database_ref: &str) -> SyncPhase {
        self.lock()
            .get(database_ref)
            .map_or(SyncPhase::Idle, |state| state.phase)
    }

    fn update(&self, database_ref: &str, apply: impl FnOnce(&mut DatabaseState)) {
        let mut databases = self.lock();
        let state = databases
            .entry(database_ref.to_string())
            .or_insert_with(|| DatabaseState {
                fingerprint: SyncFingerprint::new(database_ref),
                phase: SyncPhase::Idle,
            });
        apply(state);
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, DatabaseState>> {
        self.databases
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Exclusive claim on one database's sync slot. Dropping it returns the
/// database to [`SyncPhase::Idle`], also on early error returns.
#[derive(Debug)]
pub struct CycleGuard {
    registry: Arc<SyncRegistry>,
    database_ref: String,
}

impl CycleGuard {
    pub fn database_ref(&self) -> &str {
        &self.database_ref
    }

    pub fn set_phase(&self, phase: SyncPhase) {
        tracing::trace!(database_ref = self.database_ref.as_str(), ?phase, "Sync phase");
        self.registry
            .update(&self.database_ref, |state| state.phase = phase);
    }

    /// Record a completed cycle that observed `hash` upstream.
    pub fn record_hash(&self, hash: &str) {
        let now = rfc3339_now();
        self.registry.update(&self.database_ref, |state| {
            state.fingerprint.last_known_hash = Some(hash.to_string());
            state.fingerprint.last_sync_time = Some(now);
        });
    }

    /// Record a completed cycle that found nothing new.
    pub fn touch(&self) {
        let now = rfc3339_now();
        self.registry.update(&self.database_ref, |state| {
            state.fingerprint.last_sync_time = Some(now);
        });
    }
}

impl Drop for CycleGuard {
    fn drop(&mut self) {
        self.registry
            .update(&self.database_ref, |state| state.phase = SyncPhase::Idle);
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn second_cycle_is_rejected_until_guard_drops() {
        let registry = SyncRegistry::new();
        let guard = registry.try_begin("db", SyncPhase::Fetching).unwrap();
        assert_eq!(registry.phase("db"), SyncPhase::Fetching);
        assert!(matches!(
            registry.try_begin("db", SyncPhase::Fetching),
            Err(SyncError::CycleInProgress(_))
        ));
        assert!(registry.try_begin("other", SyncPhase::Fetching).is_ok());

        drop(guard);
        assert_eq!(registry.phase("db"), SyncPhase::Idle);
        assert!(registry.try_begin("db", SyncPhase::Fetching).is_ok());
    }

    #[test]
    fn recorded_hash_survives_guard() {
        let registry = SyncRegistry::new();
        assert_eq!(registry.fingerprint("db").last_known_hash, None);
        {
            let guard = registry.try_begin("db", SyncPhase::Fetching).unwrap();
            guard.record_hash("123");
        }
        let fingerprint = registry.fingerprint("db");
        assert_eq!(fingerprint.database_ref, "db");
        assert!(fingerprint.matches("123"));
        assert!(fingerprint.last_sync_time.is_some());
    }
}

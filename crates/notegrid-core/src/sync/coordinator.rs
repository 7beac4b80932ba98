use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

use super::{
    ChangeCheck, CycleStatus, MirrorReport, MirrorResult, ReorderOutcome, SyncError, SyncEvent,
    SyncOutcome, SyncPhase, SyncRegistry,
};
use crate::config::SyncSettings;
use crate::hash::content_hash;
use crate::identity::IdentityProvider;
use crate::models::{ContentItem, GridPreferences, OrderedCollection, SyncFingerprint};
use crate::normalize::normalize_all;
use crate::reconcile::{apply_order, reconcile};
use crate::store::LayeredStore;
use crate::upstream::{ContentSource, FetchError};
use crate::util::rfc3339_now;

const EVENT_CAPACITY: usize = 32;

/// Runs sync cycles and reorders for any number of databases.
///
/// Cycles for the same database never overlap: a second request while one is
/// running fails with [`SyncError::CycleInProgress`].
pub struct SyncCoordinator {
    source: Arc<dyn ContentSource>,
    store: Arc<LayeredStore>,
    identity: Arc<dyn IdentityProvider>,
    settings: SyncSettings,
    registry: Arc<SyncRegistry>,
    events: broadcast::Sender<SyncEvent>,
}

impl SyncCoordinator {
    pub fn new(
        source: Arc<dyn ContentSource>,
        store: Arc<LayeredStore>,
        identity: Arc<dyn IdentityProvider>,
        settings: SyncSettings,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            source,
            store,
            identity,
            settings,
            registry: SyncRegistry::new(),
            events,
        }
    }

    /// Share fingerprints and in-flight tracking with other coordinators.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<SyncRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub const fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub fn store(&self) -> &LayeredStore {
        &self.store
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub fn fingerprint(&self, database_ref: &str) -> SyncFingerprint {
        self.registry.fingerprint(database_ref)
    }

    pub fn phase(&self, database_ref: &str) -> SyncPhase {
        self.registry.phase(database_ref)
    }

    /// Fetch and normalize the current upstream items, bounded by the fetch timeout.
    async fn fetch_items(&self, database_ref: &str) -> Result<Vec<ContentItem>, FetchError> {
        let timeout = self.settings.fetch_timeout;
        let records = tokio::time::timeout(timeout, self.source.query_database(database_ref))
            .await
            .map_err(|_| FetchError::Timeout(timeout))??;
        Ok(normalize_all(&records))
    }

    /// Compare upstream against `last_known_hash` without writing anything.
    ///
    /// `has_changes` is only true when a previous hash was supplied and differs.
    #[instrument(skip(self, last_known_hash))]
    pub async fn check_for_changes(
        &self,
        database_ref: &str,
        last_known_hash: Option<&str>,
    ) -> Result<ChangeCheck, SyncError> {
        let fresh = self.fetch_items(database_ref).await?;
        let current_hash = content_hash(&fresh);
        let has_changes = last_known_hash.is_some_and(|last| last != current_hash);
        debug!(items = fresh.len(), has_changes, "Checked upstream for changes");

        Ok(ChangeCheck {
            has_changes,
            current_hash,
            change_count: fresh.len(),
            checked_at: rfc3339_now(),
        })
    }

    /// Run one sync cycle for `database_ref`.
    ///
    /// A failed fetch leaves stores and fingerprint untouched. An unchanged
    /// upstream returns the stored order without writing.
    #[instrument(skip(self))]
    pub async fn run_sync(&self, database_ref: &str) -> Result<SyncOutcome, SyncError> {
        let guard = self.registry.try_begin(database_ref, SyncPhase::Fetching)?;
        let identity = self.identity.current_identity();

        let fresh = match self.fetch_items(database_ref).await {
            Ok(fresh) => fresh,
            Err(error) => {
                self.publish_fetch_failure(database_ref, &error);
                return Err(error.into());
            }
        };

        guard.set_phase(SyncPhase::Hashing);
        let upstream_hash = content_hash(&fresh);
        let existing = self
            .store
            .read_existing(identity.as_ref(), database_ref)
            .await;

        if self.registry.fingerprint(database_ref).matches(&upstream_hash) {
            if let Some(stored) = existing.as_ref() {
                guard.touch();
                debug!(source = stored.source.as_str(), "Upstream unchanged");
                self.publish(SyncEvent::Unchanged {
                    database_ref: database_ref.to_string(),
                    content_hash: upstream_hash.clone(),
                });
                return Ok(SyncOutcome {
                    items: stored.collection.items.clone(),
                    content_hash: stored.collection.content_hash.clone(),
                    upstream_hash,
                    status: CycleStatus::Unchanged,
                    source: Some(stored.source),
                    write_report: None,
                });
            }
        }

        guard.set_phase(SyncPhase::Reconciling);
        let (custom_order, preferences) = match existing {
            Some(stored) => (Some(stored.collection.items), stored.collection.preferences),
            None => (None, GridPreferences::default()),
        };
        let merged = reconcile(custom_order.as_deref(), &fresh);
        let collection = OrderedCollection::new(merged, preferences);

        guard.set_phase(SyncPhase::Persisting);
        let report = self
            .store
            .write(identity.as_ref(), database_ref, &collection)
            .await;
        guard.record_hash(&upstream_hash);

        info!(
            items = collection.items.len(),
            content_hash = collection.content_hash.as_str(),
            failed_tiers = report.failures().count(),
            "Synced grid"
        );
        self.publish(SyncEvent::ContentChanged {
            database_ref: database_ref.to_string(),
            content_hash: collection.content_hash.clone(),
            items: collection.items.len(),
        });

        Ok(SyncOutcome {
            items: collection.items,
            content_hash: collection.content_hash,
            upstream_hash,
            status: CycleStatus::Changed,
            source: None,
            write_report: Some(report),
        })
    }

    /// Apply a user-chosen order, persist it and mirror positions upstream.
    ///
    /// The base is the stored grid, or a fresh fetch when nothing is stored.
    /// Mirroring is best-effort and reported per record.
    #[instrument(skip(self, ordered_ids), fields(ids = ordered_ids.len()))]
    pub async fn reorder(
        &self,
        database_ref: &str,
        ordered_ids: &[String],
    ) -> Result<ReorderOutcome, SyncError> {
        let guard = self
            .registry
            .try_begin(database_ref, SyncPhase::Reconciling)?;
        let identity = self.identity.current_identity();

        let (base, preferences) = match self
            .store
            .read_existing(identity.as_ref(), database_ref)
            .await
        {
            Some(stored) => (stored.collection.items, stored.collection.preferences),
            None => {
                guard.set_phase(SyncPhase::Fetching);
                let fresh = self.fetch_items(database_ref).await.inspect_err(|error| {
                    self.publish_fetch_failure(database_ref, error);
                })?;
                guard.set_phase(SyncPhase::Reconciling);
                (fresh, GridPreferences::default())
            }
        };
        if base.is_empty() {
            return Err(SyncError::EmptyGrid(database_ref.to_string()));
        }

        let collection = OrderedCollection::new(apply_order(&base, ordered_ids), preferences);

        guard.set_phase(SyncPhase::Persisting);
        let write_report = self
            .store
            .write(identity.as_ref(), database_ref, &collection)
            .await;
        // The order is persisted; mirroring upstream does not hold the slot.
        drop(guard);
        let mirror = self.mirror_order(&collection.items).await;

        info!(
            items = collection.items.len(),
            mirrored = mirror.updated,
            "Applied custom order"
        );
        self.publish(SyncEvent::Reordered {
            database_ref: database_ref.to_string(),
            content_hash: collection.content_hash.clone(),
        });

        Ok(ReorderOutcome {
            items: collection.items,
            content_hash: collection.content_hash,
            write_report,
            mirror,
        })
    }

    /// Push each position upstream concurrently, each call bounded by the fetch timeout.
    async fn mirror_order(&self, items: &[ContentItem]) -> MirrorReport {
        let timeout = self.settings.fetch_timeout;
        let updates = items.iter().enumerate().map(|(index, item)| {
            let position = u32::try_from(index + 1).unwrap_or(u32::MAX);
            async move {
                let update = self.source.update_record_order(&item.id, position);
                let result = tokio::time::timeout(timeout, update)
                    .await
                    .unwrap_or(Err(FetchError::Timeout(timeout)));
                match result {
                    Ok(()) => MirrorResult {
                        id: item.id.clone(),
                        position,
                        success: true,
                        error: None,
                    },
                    Err(error) => {
                        warn!(record = item.id.as_str(), %error, "Failed to mirror order upstream");
                        MirrorResult {
                            id: item.id.clone(),
                            position,
                            success: false,
                            error: Some(error.to_string()),
                        }
                    }
                }
            }
        });

        let results = join_all(updates).await;
        MirrorReport {
            updated: results.iter().filter(|result| result.success).count(),
            total: results.len(),
            results,
        }
    }

    fn publish_fetch_failure(&self, database_ref: &str, error: &FetchError) {
        if error.is_reconnect_required() {
            warn!(database_ref, %error, "Upstream credential rejected");
            self.publish(SyncEvent::ReconnectRequired {
                database_ref: database_ref.to_string(),
            });
        } else {
            warn!(database_ref, %error, "Upstream fetch failed");
            self.publish(SyncEvent::FetchFailed {
                database_ref: database_ref.to_string(),
                error: error.to_string(),
            });
        }
    }

    fn publish(&self, event: SyncEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::identity::{Identity, StaticIdentity};
    use crate::store::{GridStore, MemoryGridStore, ReadSource, StoreKey, StoreTier};
    use crate::upstream::{notion_page, InMemorySource};

    const DB: &str = "db-1";

    struct Harness {
        source: Arc<InMemorySource>,
        store: Arc<LayeredStore>,
        coordinator: SyncCoordinator,
    }

    fn harness(identity: Option<Identity>) -> Harness {
        let source = Arc::new(InMemorySource::default());
        let store = Arc::new(LayeredStore::in_memory());
        let coordinator = SyncCoordinator::new(
            source.clone(),
            store.clone(),
            Arc::new(StaticIdentity::from(identity)),
            SyncSettings::default(),
        );
        Harness {
            source,
            store,
            coordinator,
        }
    }

    fn page(id: &str, title: &str) -> serde_json::Value {
        notion_page(
            id,
            title,
            &format!("https://img/{id}.jpg"),
            "2024-01-02T00:00:00.000Z",
        )
    }

    fn ids(items: &[ContentItem]) -> Vec<&str> {
        items.iter().map(|item| item.id.as_str()).collect()
    }

    #[tokio::test]
    async fn first_sync_persists_fresh_items() {
        let h = harness(None);
        h.source.set_pages(vec![page("a", "A"), page("b", "B")]);

        let outcome = h.coordinator.run_sync(DB).await.unwrap();
        assert_eq!(outcome.status, CycleStatus::Changed);
        assert_eq!(ids(&outcome.items), vec!["a", "b"]);
        let report = outcome.write_report.unwrap();
        assert!(report.succeeded(StoreTier::Cache));
        assert!(report.succeeded(StoreTier::Shared));

        let fingerprint = h.coordinator.fingerprint(DB);
        assert!(fingerprint.matches(&outcome.upstream_hash));
        assert_eq!(h.coordinator.phase(DB), SyncPhase::Idle);
    }

    #[tokio::test]
    async fn unchanged_upstream_returns_stored_order() {
        let h = harness(None);
        h.source.set_pages(vec![page("a", "A"), page("b", "B")]);
        h.coordinator.run_sync(DB).await.unwrap();
        h.coordinator
            .reorder(DB, &["b".to_string(), "a".to_string()])
            .await
            .unwrap();

        let outcome = h.coordinator.run_sync(DB).await.unwrap();
        assert_eq!(outcome.status, CycleStatus::Unchanged);
        assert_eq!(outcome.source, Some(ReadSource::Shared));
        assert_eq!(ids(&outcome.items), vec!["b", "a"]);
        assert!(outcome.write_report.is_none());
    }

    #[tokio::test]
    async fn changed_upstream_keeps_custom_positions() {
        let h = harness(None);
        h.source
            .set_pages(vec![page("A", "a"), page("B", "b"), page("C", "c")]);
        h.coordinator.run_sync(DB).await.unwrap();
        h.coordinator
            .reorder(DB, &["C".to_string(), "A".to_string(), "B".to_string()])
            .await
            .unwrap();

        h.source.set_pages(vec![
            page("A", "a2"),
            page("B", "b2"),
            page("C", "c2"),
            page("D", "d"),
        ]);
        let outcome = h.coordinator.run_sync(DB).await.unwrap();
        assert_eq!(outcome.status, CycleStatus::Changed);
        assert_eq!(ids(&outcome.items), vec!["C", "A", "B", "D"]);
        assert_eq!(outcome.items[0].title, "c2");
    }

    #[tokio::test]
    async fn failed_fetch_mutates_nothing() {
        let h = harness(None);
        h.source.set_pages(vec![page("a", "A")]);
        let first = h.coordinator.run_sync(DB).await.unwrap();
        let stored_before = h.store.read_existing(None, DB).await.unwrap();

        h.source
            .fail_with(Some(FetchError::Transient("network down".to_string())));
        h.source.set_pages(vec![page("z", "Z")]);
        let mut events = h.coordinator.subscribe();

        let error = h.coordinator.run_sync(DB).await.unwrap_err();
        assert!(matches!(error, SyncError::Fetch(FetchError::Transient(_))));
        assert!(!error.is_reconnect_required());
        assert!(h.coordinator.fingerprint(DB).matches(&first.upstream_hash));
        assert_eq!(h.store.read_existing(None, DB).await.unwrap(), stored_before);
        assert!(matches!(
            events.recv().await.unwrap(),
            SyncEvent::FetchFailed { .. }
        ));
    }

    #[tokio::test]
    async fn auth_failure_is_reported_as_reconnect() {
        let h = harness(None);
        h.source
            .fail_with(Some(FetchError::Auth("token revoked".to_string())));
        let mut events = h.coordinator.subscribe();

        let error = h.coordinator.run_sync(DB).await.unwrap_err();
        assert!(error.is_reconnect_required());
        assert_eq!(
            events.recv().await.unwrap(),
            SyncEvent::ReconnectRequired {
                database_ref: DB.to_string()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn slow_fetch_times_out() {
        let h = harness(None);
        h.source.set_pages(vec![page("a", "A")]);
        h.source.set_delay(Some(Duration::from_secs(60)));

        let error = h.coordinator.run_sync(DB).await.unwrap_err();
        assert!(matches!(
            error,
            SyncError::Fetch(FetchError::Timeout(timeout)) if timeout == Duration::from_secs(15)
        ));
        assert!(h.store.read_existing(None, DB).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_cycles_are_rejected() {
        let h = harness(None);
        h.source.set_pages(vec![page("a", "A")]);
        h.source.set_delay(Some(Duration::from_secs(1)));

        let (first, second) = tokio::join!(h.coordinator.run_sync(DB), async {
            tokio::task::yield_now().await;
            h.coordinator.run_sync(DB).await
        });
        assert!(first.is_ok());
        assert!(matches!(second, Err(SyncError::CycleInProgress(_))));
        assert_eq!(h.source.query_count(), 1);
    }

    #[tokio::test]
    async fn check_for_changes_compares_hashes_without_writing() {
        let h = harness(None);
        h.source.set_pages(vec![page("a", "A"), page("b", "B")]);

        let initial = h.coordinator.check_for_changes(DB, None).await.unwrap();
        assert!(!initial.has_changes);
        assert_eq!(initial.change_count, 2);

        let same = h
            .coordinator
            .check_for_changes(DB, Some(&initial.current_hash))
            .await
            .unwrap();
        assert!(!same.has_changes);

        h.source.set_pages(vec![page("a", "A renamed"), page("b", "B")]);
        let changed = h
            .coordinator
            .check_for_changes(DB, Some(&initial.current_hash))
            .await
            .unwrap();
        assert!(changed.has_changes);
        assert_ne!(changed.current_hash, initial.current_hash);
        assert!(h.store.read_existing(None, DB).await.is_none());
    }

    #[tokio::test]
    async fn reorder_mirrors_positions_and_reports_failures() {
        let h = harness(None);
        h.source
            .set_pages(vec![page("a", "A"), page("b", "B"), page("c", "C")]);
        h.source.fail_order_update("b");

        let outcome = h
            .coordinator
            .reorder(DB, &["c".to_string(), "a".to_string()])
            .await
            .unwrap();

        assert_eq!(ids(&outcome.items), vec!["c", "a", "b"]);
        assert_eq!(outcome.mirror.total, 3);
        assert_eq!(outcome.mirror.updated, 2);
        assert!(!outcome.mirror.is_complete());
        assert_eq!(
            h.source.order_updates(),
            vec![("a".to_string(), 2), ("c".to_string(), 1)]
        );
        let stored = h.store.read_existing(None, DB).await.unwrap();
        assert_eq!(ids(&stored.collection.items), vec!["c", "a", "b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_order_mirror_times_out_and_frees_the_database() {
        let h = harness(None);
        h.source.set_pages(vec![page("a", "A"), page("b", "B")]);
        h.coordinator.run_sync(DB).await.unwrap();
        h.source.stall_order_updates(true);

        let outcome = h
            .coordinator
            .reorder(DB, &["b".to_string()])
            .await
            .unwrap();
        assert_eq!(ids(&outcome.items), vec!["b", "a"]);
        assert_eq!(outcome.mirror.total, 2);
        assert_eq!(outcome.mirror.updated, 0);
        assert!(outcome.mirror.results.iter().all(|result| result
            .error
            .as_deref()
            .is_some_and(|error| error.contains("timed out"))));
        assert_eq!(h.coordinator.phase(DB), SyncPhase::Idle);

        let stored = h.store.read_existing(None, DB).await.unwrap();
        assert_eq!(ids(&stored.collection.items), vec!["b", "a"]);
        assert!(h.coordinator.run_sync(DB).await.is_ok());
    }

    #[tokio::test]
    async fn reorder_of_empty_grid_is_rejected() {
        let h = harness(None);
        let error = h.coordinator.reorder(DB, &[]).await.unwrap_err();
        assert!(matches!(error, SyncError::EmptyGrid(_)));
    }

    #[tokio::test]
    async fn end_to_end_sync_reaches_all_tiers_and_public_read() {
        let user = Identity::new("user-1", "access-token");
        let authoritative = Arc::new(MemoryGridStore::per_user());
        let shared = Arc::new(MemoryGridStore::shared());
        let cache = Arc::new(MemoryGridStore::shared());
        let store = Arc::new(
            LayeredStore::new(cache.clone())
                .with_authoritative(authoritative.clone())
                .with_shared(shared.clone()),
        );
        let source = Arc::new(InMemorySource::new(vec![
            page("p1", "Sunset"),
            page("p2", "Coffee"),
        ]));
        let coordinator = SyncCoordinator::new(
            source,
            store.clone(),
            Arc::new(StaticIdentity::new(user.clone())),
            SyncSettings::default(),
        );

        let outcome = coordinator.run_sync(DB).await.unwrap();
        assert_eq!(ids(&outcome.items), vec!["p1", "p2"]);
        assert!(outcome.write_report.unwrap().all_succeeded());

        let owned_key = StoreKey::new(Some(user), DB);
        for tier in [
            authoritative.get(&owned_key).await.unwrap(),
            shared.get(&owned_key).await.unwrap(),
            cache.get(&owned_key).await.unwrap(),
        ] {
            let grid = tier.unwrap();
            assert_eq!(ids(&grid.items), vec!["p1", "p2"]);
            assert_eq!(grid.content_hash, outcome.content_hash);
        }

        let public = store.read(None, DB).await;
        assert_eq!(public.source, ReadSource::Shared);
        assert_eq!(public.collection.items[0].title, "Sunset");
        assert_eq!(public.collection.items[1].title, "Coffee");
    }
}

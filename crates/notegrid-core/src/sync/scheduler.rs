use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::{CycleStatus, SyncCoordinator, SyncError, SyncPhase};
use crate::config::{MAX_SYNC_INTERVAL_SECS, MIN_SYNC_INTERVAL_SECS};
use crate::models::GridPreferences;

/// Why a scheduler loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerExit {
    Stopped,
    /// The upstream credential was rejected; a new one is needed before restarting.
    ReconnectRequired,
}

/// Point-in-time view of one scheduled database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub database_ref: String,
    pub phase: SyncPhase,
    pub last_known_hash: Option<String>,
    pub last_sync_time: Option<String>,
    pub online: bool,
    pub auto_sync: bool,
}

/// Periodic sync driver for a single database.
pub struct SyncScheduler {
    coordinator: Arc<SyncCoordinator>,
    database_ref: String,
    interval: Duration,
    auto_sync: bool,
    connectivity: Option<watch::Receiver<bool>>,
}

enum Wake {
    Stop,
    Connectivity(Option<bool>),
    Manual,
    Tick,
}

impl SyncScheduler {
    pub fn new(coordinator: Arc<SyncCoordinator>, database_ref: impl Into<String>) -> Self {
        let settings = coordinator.settings();
        let interval = settings.sync_interval;
        let auto_sync = settings.auto_sync;
        Self {
            coordinator,
            database_ref: database_ref.into(),
            interval,
            auto_sync,
            connectivity: None,
        }
    }

    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// With auto sync off only [`SchedulerHandle::trigger`] starts cycles.
    #[must_use]
    pub const fn with_auto_sync(mut self, auto_sync: bool) -> Self {
        self.auto_sync = auto_sync;
        self
    }

    /// Adopt the polling preferences stored with a grid. The interval is
    /// clamped to the range the environment settings accept.
    #[must_use]
    pub fn with_preferences(mut self, preferences: &GridPreferences) -> Self {
        let secs = (preferences.sync_interval / 1_000)
            .clamp(MIN_SYNC_INTERVAL_SECS, MAX_SYNC_INTERVAL_SECS);
        self.interval = Duration::from_secs(secs);
        self.auto_sync = preferences.auto_sync;
        self
    }

    /// Follow an online/offline signal. Timer ticks are skipped while it is
    /// `false`; a switch back to `true` syncs immediately.
    #[must_use]
    pub fn with_connectivity(mut self, connectivity: watch::Receiver<bool>) -> Self {
        self.connectivity = Some(connectivity);
        self
    }

    /// Spawn the loop on the current runtime. The first timer tick fires immediately.
    pub fn start(self) -> SchedulerHandle {
        let (stop_tx, stop_rx) = oneshot::channel();
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let online = Arc::new(AtomicBool::new(
            self.connectivity
                .as_ref()
                .is_none_or(|connectivity| *connectivity.borrow()),
        ));

        let handle_coordinator = Arc::clone(&self.coordinator);
        let database_ref = self.database_ref.clone();
        let auto_sync = self.auto_sync;
        let task = tokio::spawn(self.run(stop_rx, trigger_rx, Arc::clone(&online)));

        SchedulerHandle {
            coordinator: handle_coordinator,
            database_ref,
            auto_sync,
            online,
            stop_tx: Some(stop_tx),
            trigger_tx,
            task,
        }
    }

    async fn run(
        mut self,
        mut stop_rx: oneshot::Receiver<()>,
        mut trigger_rx: mpsc::Receiver<()>,
        online: Arc<AtomicBool>,
    ) -> SchedulerExit {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let auto_sync = self.auto_sync;
        info!(
            database_ref = self.database_ref.as_str(),
            interval_secs = self.interval.as_secs(),
            auto_sync,
            "Sync scheduler started"
        );

        loop {
            let wake = tokio::select! {
                biased;
                _ = &mut stop_rx => Wake::Stop,
                change = connectivity_changed(self.connectivity.as_mut()) => Wake::Connectivity(change),
                Some(()) = trigger_rx.recv() => Wake::Manual,
                _ = ticker.tick(), if auto_sync => Wake::Tick,
            };

            match wake {
                Wake::Stop => break,
                Wake::Connectivity(None) => {
                    debug!("Connectivity signal closed, assuming online");
                    self.connectivity = None;
                    online.store(true, Ordering::SeqCst);
                    continue;
                }
                Wake::Connectivity(Some(false)) => {
                    if online.swap(false, Ordering::SeqCst) {
                        info!(database_ref = self.database_ref.as_str(), "Offline, pausing sync");
                    }
                    continue;
                }
                Wake::Connectivity(Some(true)) => {
                    if online.swap(true, Ordering::SeqCst) {
                        continue;
                    }
                    info!(database_ref = self.database_ref.as_str(), "Back online, syncing");
                }
                Wake::Tick if !online.load(Ordering::SeqCst) => {
                    debug!(database_ref = self.database_ref.as_str(), "Offline, skipping tick");
                    continue;
                }
                Wake::Tick | Wake::Manual => {}
            }

            if let Some(exit) = self.run_cycle().await {
                return exit;
            }
        }

        info!(database_ref = self.database_ref.as_str(), "Sync scheduler stopped");
        SchedulerExit::Stopped
    }

    async fn run_cycle(&self) -> Option<SchedulerExit> {
        match self.coordinator.run_sync(&self.database_ref).await {
            Ok(outcome) => {
                if outcome.status == CycleStatus::Changed {
                    info!(
                        database_ref = self.database_ref.as_str(),
                        items = outcome.items.len(),
                        "Scheduled sync stored new content"
                    );
                }
                None
            }
            Err(SyncError::CycleInProgress(_)) => {
                debug!(
                    database_ref = self.database_ref.as_str(),
                    "Cycle already running, skipping"
                );
                None
            }
            Err(error) if error.is_reconnect_required() => {
                warn!(
                    database_ref = self.database_ref.as_str(),
                    %error,
                    "Upstream credential rejected, stopping scheduler"
                );
                Some(SchedulerExit::ReconnectRequired)
            }
            Err(error) => {
                warn!(
                    database_ref = self.database_ref.as_str(),
                    %error,
                    "Scheduled sync failed"
                );
                None
            }
        }
    }
}

async fn connectivity_changed(connectivity: Option<&mut watch::Receiver<bool>>) -> Option<bool> {
    match connectivity {
        Some(receiver) => match receiver.changed().await {
            Ok(()) => Some(*receiver.borrow_and_update()),
            Err(_) => None,
        },
        None => std::future::pending().await,
    }
}

/// Control surface for a running [`SyncScheduler`].
///
/// Dropping the handle stops the loop after any in-flight cycle.
pub struct SchedulerHandle {
    coordinator: Arc<SyncCoordinator>,
    database_ref: String,
    auto_sync: bool,
    online: Arc<AtomicBool>,
    stop_tx: Option<oneshot::Sender<()>>,
    trigger_tx: mpsc::Sender<()>,
    task: JoinHandle<SchedulerExit>,
}

impl SchedulerHandle {
    /// Request a sync now. Returns `false` if one is already queued or the loop ended.
    pub fn trigger(&self) -> bool {
        self.trigger_tx.try_send(()).is_ok()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn status(&self) -> SyncStatus {
        let fingerprint = self.coordinator.fingerprint(&self.database_ref);
        SyncStatus {
            database_ref: self.database_ref.clone(),
            phase: self.coordinator.phase(&self.database_ref),
            last_known_hash: fingerprint.last_known_hash,
            last_sync_time: fingerprint.last_sync_time,
            online: self.online.load(Ordering::SeqCst),
            auto_sync: self.auto_sync,
        }
    }

    /// Stop the timer and wait for the loop; an in-flight cycle completes first.
    pub async fn stop(mut self) -> SchedulerExit {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        join(self.task).await
    }

    /// Wait for the loop to end on its own.
    pub async fn wait(self) -> SchedulerExit {
        join(self.task).await
    }
}

async fn join(task: JoinHandle<SchedulerExit>) -> SchedulerExit {
    match task.await {
        Ok(exit) => exit,
        Err(join_error) => {
            error!(%join_error, "Sync scheduler task failed");
            SchedulerExit::Stopped
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::SyncSettings;
    use crate::identity::StaticIdentity;
    use crate::store::LayeredStore;
    use crate::upstream::{notion_page, FetchError, InMemorySource};

    const DB: &str = "db-1";

    fn setup() -> (Arc<InMemorySource>, Arc<SyncCoordinator>) {
        let source = Arc::new(InMemorySource::new(vec![notion_page(
            "p1",
            "Sunset",
            "https://img/p1.jpg",
            "2024-01-02T00:00:00.000Z",
        )]));
        let coordinator = Arc::new(SyncCoordinator::new(
            source.clone(),
            Arc::new(LayeredStore::in_memory()),
            Arc::new(StaticIdentity::anonymous()),
            SyncSettings::default(),
        ));
        (source, coordinator)
    }

    #[tokio::test(start_paused = true)]
    async fn syncs_on_start_and_every_interval() {
        let (source, coordinator) = setup();
        let handle = SyncScheduler::new(coordinator, DB)
            .with_interval(Duration::from_secs(60))
            .start();

        tokio::time::sleep(Duration::from_secs(130)).await;
        let status = handle.status();
        assert_eq!(handle.stop().await, SchedulerExit::Stopped);

        assert_eq!(source.query_count(), 3);
        assert!(status.online);
        assert!(status.last_known_hash.is_some());
        assert_eq!(status.phase, SyncPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn offline_skips_ticks_and_reconnect_syncs_immediately() {
        let (source, coordinator) = setup();
        let (online_tx, online_rx) = watch::channel(false);
        let handle = SyncScheduler::new(coordinator, DB)
            .with_interval(Duration::from_secs(60))
            .with_connectivity(online_rx)
            .start();

        tokio::time::sleep(Duration::from_secs(130)).await;
        assert_eq!(source.query_count(), 0);
        assert!(!handle.status().online);

        online_tx.send(true).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(source.query_count(), 1);
        assert!(handle.status().online);

        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn auth_failure_ends_the_loop() {
        let (source, coordinator) = setup();
        source.fail_with(Some(FetchError::Auth("revoked".to_string())));
        let handle = SyncScheduler::new(coordinator, DB)
            .with_interval(Duration::from_secs(60))
            .start();

        assert_eq!(handle.wait().await, SchedulerExit::ReconnectRequired);
        assert_eq!(source.query_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_keep_polling() {
        let (source, coordinator) = setup();
        source.fail_with(Some(FetchError::Transient("offline".to_string())));
        let handle = SyncScheduler::new(coordinator, DB)
            .with_interval(Duration::from_secs(60))
            .start();

        tokio::time::sleep(Duration::from_secs(70)).await;
        assert!(!handle.is_finished());
        assert_eq!(source.query_count(), 2);
        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn manual_trigger_works_without_auto_sync() {
        let (source, coordinator) = setup();
        let handle = SyncScheduler::new(coordinator, DB)
            .with_auto_sync(false)
            .start();

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(source.query_count(), 0);
        assert!(!handle.status().auto_sync);

        assert!(handle.trigger());
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(source.query_count(), 1);
        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stored_preferences_drive_the_timer() {
        let (source, coordinator) = setup();
        let preferences = GridPreferences {
            sync_interval: 60_000,
            ..GridPreferences::default()
        };
        let handle = SyncScheduler::new(coordinator.clone(), DB)
            .with_preferences(&preferences)
            .start();
        tokio::time::sleep(Duration::from_secs(130)).await;
        handle.stop().await;
        assert_eq!(source.query_count(), 3);

        let paused = GridPreferences {
            auto_sync: false,
            ..GridPreferences::default()
        };
        let handle = SyncScheduler::new(coordinator, DB)
            .with_preferences(&paused)
            .start();
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert!(!handle.status().auto_sync);
        handle.stop().await;
        assert_eq!(source.query_count(), 3);
    }

    #[test]
    fn preference_interval_is_clamped() {
        let (_, coordinator) = setup();
        let fast = GridPreferences {
            sync_interval: 1_000,
            ..GridPreferences::default()
        };
        let scheduler = SyncScheduler::new(coordinator, DB).with_preferences(&fast);
        assert_eq!(scheduler.interval, Duration::from_secs(MIN_SYNC_INTERVAL_SECS));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_lets_the_running_cycle_persist() {
        let (source, coordinator) = setup();
        source.set_delay(Some(Duration::from_secs(5)));
        let handle = SyncScheduler::new(coordinator.clone(), DB)
            .with_interval(Duration::from_secs(60))
            .start();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(coordinator.phase(DB), SyncPhase::Fetching);
        assert_eq!(handle.stop().await, SchedulerExit::Stopped);

        let stored = coordinator.store().read_existing(None, DB).await.unwrap();
        assert_eq!(stored.collection.items[0].title, "Sunset");
        assert_eq!(coordinator.phase(DB), SyncPhase::Idle);
    }
}

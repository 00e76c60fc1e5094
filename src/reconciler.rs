//! Reboot completion tracking.
//!
//! A reboot is acknowledged by EC2 long before the instance is usable again.
//! Each accepted reboot gets a watch in the registry and a background task
//! that polls status checks until the instance is healthy or the attempt
//! budget runs out. Only the newest watch for an instance id may write state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::events::{EventBus, EventLevel};
use crate::lifecycle::LifecycleController;
use crate::model::{FleetSnapshot, InstanceState, RebootWatch};
use crate::state::FleetState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilerConfig {
    pub poll_interval: Duration,
    pub max_attempts: u32,
    /// Emit a progress event every this many ticks.
    pub progress_every: u32,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            max_attempts: 60,
            progress_every: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebootOutcome {
    /// Running with both status checks passing.
    Completed,
    /// Attempt budget exhausted; local state optimistically set back to running.
    TimedOut,
    /// Replaced by a newer watch or cancelled by another command.
    Superseded,
}

struct WatchEntry {
    region: String,
    generation: u64,
    attempts: u32,
    cancel: Arc<Notify>,
}

struct Inner {
    config: ReconcilerConfig,
    lifecycle: Arc<LifecycleController>,
    fleet: Arc<FleetState>,
    events: EventBus,
    // Lock order: watches before fleet.
    watches: Mutex<HashMap<String, WatchEntry>>,
    next_generation: AtomicU64,
}

#[derive(Clone)]
pub struct RebootReconciler {
    inner: Arc<Inner>,
}

impl RebootReconciler {
    pub fn new(
        config: ReconcilerConfig,
        lifecycle: Arc<LifecycleController>,
        fleet: Arc<FleetState>,
        events: EventBus,
    ) -> Self {
        let config = ReconcilerConfig {
            progress_every: config.progress_every.max(1),
            ..config
        };

        Self {
            inner: Arc::new(Inner {
                config,
                lifecycle,
                fleet,
                events,
                watches: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(1),
            }),
        }
    }

    /// Marks the instance as rebooting and starts watching it, superseding any
    /// watch already running for the same id.
    pub fn begin(&self, instance_id: &str, region: &str) -> JoinHandle<RebootOutcome> {
        let generation = self.inner.next_generation.fetch_add(1, Ordering::SeqCst);
        let cancel = Arc::new(Notify::new());

        {
            let mut watches = self.inner.lock_watches();
            let previous = watches.insert(
                instance_id.to_string(),
                WatchEntry {
                    region: region.to_string(),
                    generation,
                    attempts: 0,
                    cancel: Arc::clone(&cancel),
                },
            );

            if let Some(previous) = previous {
                previous.cancel.notify_one();
                info!(
                    instance_id = %instance_id,
                    region = %region,
                    previous_attempts = previous.attempts,
                    "Superseding active reboot watch"
                );
            }

            self.inner
                .fleet
                .set_state(instance_id, InstanceState::Rebooting);
        }

        debug!(
            instance_id = %instance_id,
            region = %region,
            generation = generation,
            poll_interval_seconds = self.inner.config.poll_interval.as_secs(),
            max_attempts = self.inner.config.max_attempts,
            "Reboot watch started"
        );

        tokio::spawn(Arc::clone(&self.inner).poll(
            instance_id.to_string(),
            region.to_string(),
            generation,
            cancel,
        ))
    }

    /// Drops the watch for an instance without touching its state. Returns
    /// whether a watch was active.
    pub fn cancel(&self, instance_id: &str) -> bool {
        let Some(entry) = self.inner.lock_watches().remove(instance_id) else {
            return false;
        };

        entry.cancel.notify_one();
        info!(
            instance_id = %instance_id,
            region = %entry.region,
            attempts_elapsed = entry.attempts,
            "Reboot watch cancelled"
        );
        true
    }

    pub fn is_watching(&self, instance_id: &str) -> bool {
        self.inner.lock_watches().contains_key(instance_id)
    }

    pub fn watches(&self) -> Vec<RebootWatch> {
        let mut watches: Vec<_> = self
            .inner
            .lock_watches()
            .iter()
            .map(|(id, entry)| RebootWatch {
                instance_id: id.clone(),
                region: entry.region.clone(),
                attempts_elapsed: entry.attempts,
            })
            .collect();
        watches.sort_by(|a, b| a.instance_id.cmp(&b.instance_id));
        watches
    }

    /// Installs a freshly scanned snapshot while keeping watched instances in
    /// the rebooting state.
    pub fn apply_scan(&self, snapshot: FleetSnapshot) -> usize {
        let watches = self.inner.lock_watches();
        self.inner
            .fleet
            .replace(snapshot, |id| watches.contains_key(id))
    }
}

impl Inner {
    fn lock_watches(&self) -> MutexGuard<'_, HashMap<String, WatchEntry>> {
        self.watches.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn poll(
        self: Arc<Self>,
        instance_id: String,
        region: String,
        generation: u64,
        cancel: Arc<Notify>,
    ) -> RebootOutcome {
        for attempt in 0..self.config.max_attempts {
            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = cancel.notified() => return self.superseded(&instance_id, generation),
            }

            if !self.record_attempt(&instance_id, generation, attempt + 1) {
                return self.superseded(&instance_id, generation);
            }

            match self.lifecycle.get_status_checks(&instance_id, &region).await {
                Ok(checks) if checks.is_healthy() => {
                    if !self.finish(&instance_id, generation, RebootOutcome::Completed) {
                        return self.superseded(&instance_id, generation);
                    }
                    self.events.instance(
                        EventLevel::Success,
                        &instance_id,
                        &region,
                        format!(
                            "Reboot of {} completed (system: {}, instance: {})",
                            instance_id, checks.system_status, checks.instance_status
                        ),
                    );
                    return RebootOutcome::Completed;
                }
                Ok(checks) => {
                    if attempt % self.config.progress_every == 0 {
                        self.events.instance(
                            EventLevel::Info,
                            &instance_id,
                            &region,
                            format!(
                                "Waiting for reboot of {}: state {}, system {}, instance {}",
                                instance_id,
                                checks.instance_state,
                                checks.system_status,
                                checks.instance_status
                            ),
                        );
                    }
                }
                Err(e) => {
                    self.events.instance(
                        EventLevel::Warning,
                        &instance_id,
                        &region,
                        format!("Status check failed while waiting for reboot: {}", e),
                    );
                }
            }
        }

        if !self.finish(&instance_id, generation, RebootOutcome::TimedOut) {
            return self.superseded(&instance_id, generation);
        }

        self.events.instance(
            EventLevel::Warning,
            &instance_id,
            &region,
            format!(
                "Reboot of {} not confirmed healthy after {} checks, assuming running; refresh to confirm",
                instance_id, self.config.max_attempts
            ),
        );
        RebootOutcome::TimedOut
    }

    /// Returns false when this watch is no longer the current one.
    fn record_attempt(&self, instance_id: &str, generation: u64, attempts: u32) -> bool {
        match self.lock_watches().get_mut(instance_id) {
            Some(entry) if entry.generation == generation => {
                entry.attempts = attempts;
                true
            }
            _ => false,
        }
    }

    fn finish(&self, instance_id: &str, generation: u64, outcome: RebootOutcome) -> bool {
        let mut watches = self.lock_watches();
        match watches.get(instance_id) {
            Some(entry) if entry.generation == generation => {
                watches.remove(instance_id);
            }
            _ => return false,
        }

        match outcome {
            RebootOutcome::Completed => {
                self.fleet.set_state(instance_id, InstanceState::Running);
            }
            RebootOutcome::TimedOut => {
                self.fleet.transition(
                    instance_id,
                    InstanceState::Rebooting,
                    InstanceState::Running,
                );
            }
            RebootOutcome::Superseded => {}
        }
        true
    }

    fn superseded(&self, instance_id: &str, generation: u64) -> RebootOutcome {
        debug!(
            instance_id = %instance_id,
            generation = generation,
            "Reboot watch superseded, stopping poll loop"
        );
        RebootOutcome::Superseded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::FleetEvent;
    use crate::fake::{FakeCloud, FakeFactory, checks, network_fault, record};
    use crate::model::CheckStatus;
    use crate::pool::ClientPool;
    use tokio::sync::broadcast;

    struct Harness {
        cloud: FakeCloud,
        fleet: Arc<FleetState>,
        reconciler: RebootReconciler,
        events: broadcast::Receiver<FleetEvent>,
    }

    fn harness(cloud: FakeCloud, config: ReconcilerConfig) -> Harness {
        let pool = Arc::new(ClientPool::new(Arc::new(FakeFactory::new(cloud.clone()))));
        let fleet = Arc::new(FleetState::new());
        fleet.replace(
            FleetSnapshot::new(vec![
                record("i-123", "r1", InstanceState::Running),
                record("i-456", "r1", InstanceState::Running),
            ]),
            |_| false,
        );
        let bus = EventBus::new();
        let events = bus.subscribe();
        let reconciler = RebootReconciler::new(
            config,
            Arc::new(LifecycleController::new(pool)),
            Arc::clone(&fleet),
            bus,
        );

        Harness {
            cloud,
            fleet,
            reconciler,
            events,
        }
    }

    fn initializing() -> crate::model::StatusChecks {
        checks(
            InstanceState::Running,
            CheckStatus::Initializing,
            CheckStatus::Initializing,
        )
    }

    fn healthy() -> crate::model::StatusChecks {
        checks(InstanceState::Running, CheckStatus::Ok, CheckStatus::Ok)
    }

    fn drain(events: &mut broadcast::Receiver<FleetEvent>) -> Vec<FleetEvent> {
        let mut drained = Vec::new();
        while let Ok(event) = events.try_recv() {
            drained.push(event);
        }
        drained
    }

    #[tokio::test(start_paused = true)]
    async fn test_completes_on_third_poll() {
        let cloud = FakeCloud::new().script_status(
            "i-123",
            vec![Ok(Some(initializing())), Ok(Some(initializing())), Ok(Some(healthy()))],
        );
        let mut h = harness(cloud, ReconcilerConfig::default());

        let handle = h.reconciler.begin("i-123", "r1");
        assert_eq!(h.fleet.state_of("i-123"), Some(InstanceState::Rebooting));
        assert!(h.reconciler.is_watching("i-123"));

        assert_eq!(handle.await.unwrap(), RebootOutcome::Completed);
        assert_eq!(h.fleet.state_of("i-123"), Some(InstanceState::Running));
        assert!(h.reconciler.watches().is_empty());
        assert_eq!(h.cloud.status_calls(), 3);

        let events = drain(&mut h.events);
        assert_eq!(events.last().map(|e| e.level), Some(EventLevel::Success));
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_and_reverts_to_running() {
        let cloud = FakeCloud::new().script_status("i-123", vec![Ok(Some(initializing()))]);
        let mut h = harness(cloud, ReconcilerConfig::default());

        let started = tokio::time::Instant::now();
        let outcome = h.reconciler.begin("i-123", "r1").await.unwrap();

        assert_eq!(outcome, RebootOutcome::TimedOut);
        assert_eq!(h.cloud.status_calls(), 60);
        assert!(started.elapsed() >= Duration::from_secs(300));
        assert_eq!(h.fleet.state_of("i-123"), Some(InstanceState::Running));
        assert!(!h.reconciler.is_watching("i-123"));

        let events = drain(&mut h.events);
        let last = events.last().unwrap();
        assert_eq!(last.level, EventLevel::Warning);
        assert!(last.message.contains("not confirmed healthy"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_leaves_non_rebooting_state_alone() {
        let cloud = FakeCloud::new().script_status("i-123", vec![Ok(Some(initializing()))]);
        let config = ReconcilerConfig {
            max_attempts: 3,
            ..ReconcilerConfig::default()
        };
        let h = harness(cloud, config);

        let handle = h.reconciler.begin("i-123", "r1");
        h.fleet.set_state("i-123", InstanceState::Stopped);

        assert_eq!(handle.await.unwrap(), RebootOutcome::TimedOut);
        assert_eq!(h.fleet.state_of("i-123"), Some(InstanceState::Stopped));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_keep_polling() {
        let cloud = FakeCloud::new().script_status(
            "i-123",
            vec![
                Err(network_fault("DescribeInstanceStatus")),
                Err(network_fault("DescribeInstanceStatus")),
                Ok(Some(healthy())),
            ],
        );
        let mut h = harness(cloud, ReconcilerConfig::default());

        let outcome = h.reconciler.begin("i-123", "r1").await.unwrap();

        assert_eq!(outcome, RebootOutcome::Completed);
        let warnings = drain(&mut h.events)
            .into_iter()
            .filter(|e| e.level == EventLevel::Warning)
            .count();
        assert_eq!(warnings, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_every_third_tick() {
        let cloud = FakeCloud::new().script_status("i-123", vec![Ok(Some(initializing()))]);
        let config = ReconcilerConfig {
            max_attempts: 7,
            ..ReconcilerConfig::default()
        };
        let mut h = harness(cloud, config);

        h.reconciler.begin("i-123", "r1").await.unwrap();

        let progress = drain(&mut h.events)
            .into_iter()
            .filter(|e| e.level == EventLevel::Info)
            .count();
        // ticks 1, 4 and 7
        assert_eq!(progress, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_reboot_supersedes_first_watch() {
        let cloud = FakeCloud::new().script_status("i-123", vec![Ok(Some(healthy()))]);
        let h = harness(cloud, ReconcilerConfig::default());

        let first = h.reconciler.begin("i-123", "r1");
        let second = h.reconciler.begin("i-123", "r1");

        assert_eq!(first.await.unwrap(), RebootOutcome::Superseded);
        assert_eq!(second.await.unwrap(), RebootOutcome::Completed);
        assert_eq!(h.fleet.state_of("i-123"), Some(InstanceState::Running));
        assert_eq!(h.cloud.status_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_watch_without_writing_state() {
        let cloud = FakeCloud::new().script_status("i-123", vec![Ok(Some(initializing()))]);
        let h = harness(cloud, ReconcilerConfig::default());

        let handle = h.reconciler.begin("i-123", "r1");
        assert!(h.reconciler.cancel("i-123"));
        assert!(!h.reconciler.cancel("i-123"));

        assert_eq!(handle.await.unwrap(), RebootOutcome::Superseded);
        assert_eq!(h.fleet.state_of("i-123"), Some(InstanceState::Rebooting));
        assert_eq!(h.cloud.status_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_during_watch_keeps_rebooting() {
        let cloud = FakeCloud::new().script_status(
            "i-123",
            vec![Ok(Some(initializing())), Ok(Some(healthy()))],
        );
        let h = harness(cloud, ReconcilerConfig::default());

        let handle = h.reconciler.begin("i-123", "r1");

        let overridden = h.reconciler.apply_scan(FleetSnapshot::new(vec![
            record("i-123", "r1", InstanceState::Running),
            record("i-456", "r1", InstanceState::Stopped),
        ]));
        assert_eq!(overridden, 1);
        assert_eq!(h.fleet.state_of("i-123"), Some(InstanceState::Rebooting));
        assert_eq!(h.fleet.state_of("i-456"), Some(InstanceState::Stopped));

        assert_eq!(handle.await.unwrap(), RebootOutcome::Completed);
        assert_eq!(h.fleet.state_of("i-123"), Some(InstanceState::Running));
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_reports_attempts() {
        let cloud = FakeCloud::new().script_status("i-123", vec![Ok(Some(initializing()))]);
        let h = harness(cloud, ReconcilerConfig::default());

        let _handle = h.reconciler.begin("i-123", "r1");
        tokio::time::sleep(Duration::from_millis(10_500)).await;

        let watches = h.reconciler.watches();
        assert_eq!(watches.len(), 1);
        assert_eq!(watches[0].instance_id, "i-123");
        assert_eq!(watches[0].region, "r1");
        assert_eq!(watches[0].attempts_elapsed, 2);
    }
}

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::cache::SnapshotCache;
use crate::error::Result;
use crate::events::{EventBus, EventLevel, FleetEvent};
use crate::fleet::{FleetAggregator, ProgressCallback, ScanReport};
use crate::lifecycle::{LifecycleAction, LifecycleController};
use crate::model::{FleetSnapshot, RebootWatch, StatusChecks};
use crate::pool::{ClientFactory, ClientPool, SdkClientFactory};
use crate::reconciler::{RebootOutcome, RebootReconciler, ReconcilerConfig};
use crate::regions::RegionDirectory;
use crate::scanner::InventoryScanner;
use crate::session::Session;
use crate::state::FleetState;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Region used for account-level calls such as region discovery.
    pub home_region: String,
    /// Fixed region list; empty means discover.
    pub regions: Vec<String>,
    pub concurrency: usize,
    pub reconciler: ReconcilerConfig,
    /// Directory holding the snapshot cache.
    pub state_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTrigger {
    Startup,
    Manual,
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Completed {
        instance_count: usize,
        failed_regions: usize,
    },
    /// Another refresh was already in flight.
    Skipped,
}

/// Releases the single-flight flag when the refresh ends, however it ends.
struct RefreshGuard<'a>(&'a AtomicBool);

impl<'a> RefreshGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Owns the fleet: scans, cached state, lifecycle commands and reboot watches.
pub struct FleetEngine {
    regions: Arc<RegionDirectory>,
    aggregator: FleetAggregator,
    lifecycle: Arc<LifecycleController>,
    reconciler: RebootReconciler,
    fleet: Arc<FleetState>,
    cache: SnapshotCache,
    events: EventBus,
    refreshing: AtomicBool,
    has_data: AtomicBool,
}

impl FleetEngine {
    pub fn new(config: EngineConfig, factory: Arc<dyn ClientFactory>) -> Self {
        let pool = Arc::new(ClientPool::new(factory));
        let regions = Arc::new(RegionDirectory::new(
            Arc::clone(&pool),
            config.home_region.clone(),
            config.regions.clone(),
        ));
        let aggregator = FleetAggregator::new(
            Arc::clone(&regions),
            InventoryScanner::new(Arc::clone(&pool)),
            config.concurrency,
        );
        let lifecycle = Arc::new(LifecycleController::new(pool));
        let fleet = Arc::new(FleetState::new());
        let events = EventBus::new();
        let reconciler = RebootReconciler::new(
            config.reconciler,
            Arc::clone(&lifecycle),
            Arc::clone(&fleet),
            events.clone(),
        );

        Self {
            regions,
            aggregator,
            lifecycle,
            reconciler,
            fleet,
            cache: SnapshotCache::new(&config.state_dir),
            events,
            refreshing: AtomicBool::new(false),
            has_data: AtomicBool::new(false),
        }
    }

    /// Engine backed by real EC2 clients derived from `session`.
    pub fn connect(session: Session, config: EngineConfig) -> Self {
        Self::new(config, Arc::new(SdkClientFactory::new(session)))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FleetEvent> {
        self.events.subscribe()
    }

    pub fn snapshot(&self) -> FleetSnapshot {
        self.fleet.snapshot()
    }

    /// True once there is something to show, cached or scanned.
    pub fn has_data(&self) -> bool {
        self.has_data.load(Ordering::Acquire)
    }

    pub fn active_watches(&self) -> Vec<RebootWatch> {
        self.reconciler.watches()
    }

    pub async fn regions(&self) -> Vec<String> {
        self.regions.resolve_or_fallback().await
    }

    /// Restores the cached snapshot so there is data before the first scan.
    pub fn load_cached(&self) -> usize {
        let snapshot = self.cache.load();
        if snapshot.is_empty() {
            return 0;
        }

        let count = snapshot.len();
        self.reconciler.apply_scan(snapshot);
        self.has_data.store(true, Ordering::Release);
        self.events.fleet(
            EventLevel::Info,
            format!("Loaded {} instances from cache", count),
        );
        count
    }

    pub async fn refresh(&self, trigger: RefreshTrigger) -> RefreshOutcome {
        self.refresh_with_progress(trigger, None).await
    }

    /// Scans the whole fleet unless a scan is already running, in which case
    /// this returns [`RefreshOutcome::Skipped`] immediately.
    pub async fn refresh_with_progress(
        &self,
        trigger: RefreshTrigger,
        on_progress: Option<ProgressCallback<'_>>,
    ) -> RefreshOutcome {
        let Some(_guard) = RefreshGuard::acquire(&self.refreshing) else {
            debug!(trigger = ?trigger, "Refresh already in progress, skipping");
            return RefreshOutcome::Skipped;
        };

        if trigger == RefreshTrigger::Manual {
            self.events
                .fleet(EventLevel::Info, "Refreshing instances across all regions");
        }

        let ScanReport {
            snapshot,
            region_count,
            failed_regions,
        } = self.aggregator.scan_all(on_progress).await;

        // The cache keeps provider truth, without synthetic states.
        self.save_to_cache(&snapshot).await;

        let instance_count = snapshot.len();
        let overridden = self.reconciler.apply_scan(snapshot);
        self.has_data.store(true, Ordering::Release);

        info!(
            trigger = ?trigger,
            instance_count = instance_count,
            region_count = region_count,
            failed_region_count = failed_regions.len(),
            rebooting_overrides = overridden,
            "Fleet snapshot applied"
        );

        if !failed_regions.is_empty() {
            let names: Vec<_> = failed_regions.iter().map(|f| f.region.as_str()).collect();
            self.events.fleet(
                EventLevel::Warning,
                format!(
                    "{} of {} regions could not be scanned: {}",
                    failed_regions.len(),
                    region_count,
                    names.join(", ")
                ),
            );
        }

        if trigger == RefreshTrigger::Manual {
            self.events.fleet(
                EventLevel::Success,
                format!("Refresh complete, {} instances", instance_count),
            );
        }

        RefreshOutcome::Completed {
            instance_count,
            failed_regions: failed_regions.len(),
        }
    }

    /// Refreshes every `period` until the task is dropped. Ticks that land on
    /// an in-flight scan are no-ops. A zero period returns immediately.
    pub async fn run_auto_refresh(&self, period: Duration) {
        if period.is_zero() {
            warn!("Auto refresh interval is zero, auto refresh disabled");
            return;
        }

        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        info!(
            interval_seconds = period.as_secs(),
            "Auto refresh started"
        );

        loop {
            ticker.tick().await;
            if self.refresh(RefreshTrigger::Auto).await == RefreshOutcome::Skipped {
                debug!("Auto refresh tick skipped, scan already in progress");
            }
        }
    }

    pub async fn start(&self, instance_id: &str, region: &str) -> Result<()> {
        self.send_command(LifecycleAction::Start, instance_id, region)
            .await?;
        self.apply_transition(LifecycleAction::Start, instance_id);
        Ok(())
    }

    pub async fn stop(&self, instance_id: &str, region: &str) -> Result<()> {
        self.send_command(LifecycleAction::Stop, instance_id, region)
            .await?;
        self.apply_transition(LifecycleAction::Stop, instance_id);
        Ok(())
    }

    /// Sends the reboot and starts watching for completion. The returned
    /// handle resolves once the watch ends.
    pub async fn reboot(&self, instance_id: &str, region: &str) -> Result<JoinHandle<RebootOutcome>> {
        self.send_command(LifecycleAction::Reboot, instance_id, region)
            .await?;
        Ok(self.reconciler.begin(instance_id, region))
    }

    pub async fn status_checks(&self, instance_id: &str, region: &str) -> Result<StatusChecks> {
        self.lifecycle.get_status_checks(instance_id, region).await
    }

    async fn save_to_cache(&self, snapshot: &FleetSnapshot) {
        let cache = self.cache.clone();
        let snapshot = snapshot.clone();

        if let Err(e) = tokio::task::spawn_blocking(move || cache.save(&snapshot)).await {
            warn!(error = %e, "Snapshot cache writer task failed");
        }
    }

    async fn send_command(&self, action: LifecycleAction, instance_id: &str, region: &str) -> Result<()> {
        self.events.instance(
            EventLevel::Info,
            instance_id,
            region,
            format!("Sending {} to {} ({})", action, instance_id, region),
        );

        if let Err(e) = self.lifecycle.execute(action, instance_id, region).await {
            self.events
                .instance(EventLevel::Error, instance_id, region, e.to_string());
            return Err(e);
        }

        self.events.instance(
            EventLevel::Success,
            instance_id,
            region,
            format!("{} accepted for {}", action, instance_id),
        );
        Ok(())
    }

    fn apply_transition(&self, action: LifecycleAction, instance_id: &str) {
        if self.reconciler.cancel(instance_id) {
            self.events.fleet(
                EventLevel::Info,
                format!("Reboot watch for {} superseded by {}", instance_id, action),
            );
        }
        self.fleet
            .set_state(instance_id, action.optimistic_state());
    }
}

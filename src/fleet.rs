use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::model::FleetSnapshot;
use crate::regions::RegionDirectory;
use crate::scanner::{InventoryScanner, ScanFailureKind};

/// Progress notification emitted once per finished region, in completion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanProgress<'a> {
    pub region: &'a str,
    pub completed: usize,
    pub total: usize,
}

pub type ProgressCallback<'a> = &'a (dyn Fn(ScanProgress<'_>) + Send + Sync);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegionFailure {
    pub region: String,
    pub kind: ScanFailureKind,
    pub message: String,
}

/// Outcome of a full fleet scan.
#[derive(Debug, Clone)]
pub struct ScanReport {
    pub snapshot: FleetSnapshot,
    pub region_count: usize,
    pub failed_regions: Vec<RegionFailure>,
}

/// Scans every region with a bounded number of regions in flight.
pub struct FleetAggregator {
    regions: Arc<RegionDirectory>,
    scanner: InventoryScanner,
    concurrency: usize,
}

impl FleetAggregator {
    pub fn new(regions: Arc<RegionDirectory>, scanner: InventoryScanner, concurrency: usize) -> Self {
        Self {
            regions,
            scanner,
            concurrency: concurrency.max(1),
        }
    }

    pub async fn scan_all(&self, on_progress: Option<ProgressCallback<'_>>) -> ScanReport {
        let regions = self.regions.resolve_or_fallback().await;
        let total = regions.len();
        let start_time = std::time::Instant::now();

        info!(
            region_count = total,
            concurrency = self.concurrency,
            "Starting fleet scan"
        );

        // Each region runs in its own task so a panicking scan cannot take the
        // whole fleet scan down with it.
        let mut scans = stream::iter(regions)
            .map(|region| {
                let scanner = self.scanner.clone();
                let task_region = region.clone();
                let handle =
                    tokio::spawn(async move { scanner.try_scan_region(&task_region).await });
                async move { (region, handle.await) }
            })
            .buffer_unordered(self.concurrency);

        let mut instances = Vec::new();
        let mut failed_regions = Vec::new();
        let mut completed = 0;

        while let Some((region, outcome)) = scans.next().await {
            completed += 1;

            match outcome {
                Ok(Ok(found)) => instances.extend(found),
                Ok(Err(e)) => {
                    let kind = ScanFailureKind::of(&e);
                    warn!(
                        region = %region,
                        failure_kind = ?kind,
                        error = %e,
                        "Region scan failed, region contributes no instances"
                    );
                    failed_regions.push(RegionFailure {
                        region: region.clone(),
                        kind,
                        message: e.to_string(),
                    });
                }
                Err(e) => {
                    warn!(
                        region = %region,
                        error = %e,
                        "Region scan task aborted, region contributes no instances"
                    );
                    failed_regions.push(RegionFailure {
                        region: region.clone(),
                        kind: ScanFailureKind::Crashed,
                        message: e.to_string(),
                    });
                }
            }

            if let Some(callback) = on_progress {
                callback(ScanProgress {
                    region: &region,
                    completed,
                    total,
                });
            }
        }

        info!(
            region_count = total,
            failed_region_count = failed_regions.len(),
            instance_count = instances.len(),
            scan_duration_seconds = format!("{:.2}", start_time.elapsed().as_secs_f64()),
            "Completed fleet scan"
        );

        ScanReport {
            snapshot: FleetSnapshot::new(instances),
            region_count: total,
            failed_regions,
        }
    }
}

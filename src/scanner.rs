use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{FleetError, Result};
use crate::model::InstanceRecord;
use crate::pool::ClientPool;

/// Coarse reason a region contributed nothing to a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScanFailureKind {
    /// Not authorized or region not opted in; will not fix itself.
    AccessDenied,
    Transient,
    /// The scan task itself died.
    Crashed,
}

impl ScanFailureKind {
    pub fn of(err: &FleetError) -> Self {
        match err {
            FleetError::RegionScan { source, .. } if source.is_access_denied() => {
                Self::AccessDenied
            }
            _ => Self::Transient,
        }
    }
}

/// Fetches the inventory of a single region.
#[derive(Clone)]
pub struct InventoryScanner {
    pool: Arc<ClientPool>,
}

impl InventoryScanner {
    pub fn new(pool: Arc<ClientPool>) -> Self {
        Self { pool }
    }

    pub async fn try_scan_region(&self, region: &str) -> Result<Vec<InstanceRecord>> {
        let start_time = std::time::Instant::now();

        let instances = self
            .pool
            .client_for(region)
            .describe_instances()
            .await
            .map_err(|source| FleetError::RegionScan {
                region: region.to_string(),
                source,
            })?;

        debug!(
            region = %region,
            instance_count = instances.len(),
            scan_duration_ms = start_time.elapsed().as_millis(),
            "Region scan completed"
        );

        Ok(instances)
    }

    /// Never fails: a region that cannot be scanned contributes no instances.
    pub async fn scan_region(&self, region: &str) -> Vec<InstanceRecord> {
        match self.try_scan_region(region).await {
            Ok(instances) => instances,
            Err(e) => {
                warn!(
                    region = %region,
                    failure_kind = ?ScanFailureKind::of(&e),
                    error = %e,
                    "Region scan failed, treating region as empty"
                );
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{FakeCloud, FakeFactory, access_denied, network_fault, record};
    use crate::model::InstanceState;

    fn scanner(cloud: FakeCloud) -> InventoryScanner {
        InventoryScanner::new(Arc::new(ClientPool::new(Arc::new(FakeFactory::new(cloud)))))
    }

    #[tokio::test]
    async fn test_scan_returns_region_instances() {
        let cloud = FakeCloud::new().with_instances(
            "r1",
            vec![
                record("i-1", "r1", InstanceState::Running),
                record("i-2", "r1", InstanceState::Stopped),
            ],
        );

        let instances = scanner(cloud).scan_region("r1").await;
        assert_eq!(instances.len(), 2);
    }

    #[tokio::test]
    async fn test_access_denied_region_is_empty() {
        let cloud = FakeCloud::new().fail_region("r1", access_denied("DescribeInstances"));
        let scanner = scanner(cloud);

        assert!(scanner.scan_region("r1").await.is_empty());

        let err = scanner.try_scan_region("r1").await.unwrap_err();
        assert_eq!(ScanFailureKind::of(&err), ScanFailureKind::AccessDenied);
    }

    #[tokio::test]
    async fn test_network_fault_is_transient() {
        let cloud = FakeCloud::new().fail_region("r1", network_fault("DescribeInstances"));
        let err = scanner(cloud).try_scan_region("r1").await.unwrap_err();

        assert_eq!(ScanFailureKind::of(&err), ScanFailureKind::Transient);
        assert!(err.to_string().starts_with("[r1] inventory scan failed"));
    }
}

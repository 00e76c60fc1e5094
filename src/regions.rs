use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::error::{FleetError, Result};
use crate::pool::ClientPool;

/// Regions scanned when live discovery is unavailable.
pub const FALLBACK_REGIONS: &[&str] = &[
    "us-east-1",
    "us-east-2",
    "us-west-1",
    "us-west-2",
    "ap-south-1",
    "ap-northeast-1",
    "ap-northeast-2",
    "ap-northeast-3",
    "ap-southeast-1",
    "ap-southeast-2",
    "ca-central-1",
    "eu-central-1",
    "eu-west-1",
    "eu-west-2",
    "eu-west-3",
    "eu-north-1",
    "sa-east-1",
];

/// Resolves which regions make up the fleet.
pub struct RegionDirectory {
    pool: Arc<ClientPool>,
    home_region: String,
    fixed: Option<Vec<String>>,
    resolved: OnceCell<Vec<String>>,
}

impl RegionDirectory {
    /// `fixed` bypasses discovery entirely when non-empty.
    pub fn new(pool: Arc<ClientPool>, home_region: impl Into<String>, fixed: Vec<String>) -> Self {
        Self {
            pool,
            home_region: home_region.into(),
            fixed: (!fixed.is_empty()).then_some(fixed),
            resolved: OnceCell::new(),
        }
    }

    /// Looks regions up once per directory; failures are not memoized.
    pub async fn resolve_regions(&self) -> Result<Vec<String>> {
        self.resolved
            .get_or_try_init(|| async {
                if let Some(fixed) = &self.fixed {
                    info!(regions = ?fixed, "Using configured region list");
                    return Ok(fixed.clone());
                }

                self.pool
                    .client_for(&self.home_region)
                    .describe_regions()
                    .await
                    .map_err(FleetError::RegionDiscovery)
            })
            .await
            .cloned()
    }

    /// Like [`resolve_regions`](Self::resolve_regions), degrading to
    /// [`FALLBACK_REGIONS`] on failure.
    pub async fn resolve_or_fallback(&self) -> Vec<String> {
        match self.resolve_regions().await {
            Ok(regions) => regions,
            Err(e) => {
                warn!(
                    error = %e,
                    fallback_region_count = FALLBACK_REGIONS.len(),
                    "Region discovery failed, falling back to static region list"
                );
                FALLBACK_REGIONS.iter().map(|r| r.to_string()).collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{FakeCloud, FakeFactory, network_fault};

    fn directory(cloud: FakeCloud, fixed: Vec<String>) -> RegionDirectory {
        let pool = Arc::new(ClientPool::new(Arc::new(FakeFactory::new(cloud))));
        RegionDirectory::new(pool, "us-east-1", fixed)
    }

    #[tokio::test]
    async fn test_discovery_is_memoized() {
        let cloud = FakeCloud::new().with_regions(&["r1", "r2"]);
        let directory = directory(cloud.clone(), Vec::new());

        assert_eq!(directory.resolve_regions().await.unwrap(), vec!["r1", "r2"]);
        assert_eq!(directory.resolve_regions().await.unwrap(), vec!["r1", "r2"]);
        assert_eq!(cloud.describe_regions_calls(), 1);
    }

    #[tokio::test]
    async fn test_fixed_list_skips_lookup() {
        let cloud = FakeCloud::new().with_regions(&["r1", "r2"]);
        let directory = directory(cloud.clone(), vec!["eu-west-1".to_string()]);

        assert_eq!(directory.resolve_regions().await.unwrap(), vec!["eu-west-1"]);
        assert_eq!(cloud.describe_regions_calls(), 0);
    }

    #[tokio::test]
    async fn test_failure_is_not_memoized_and_falls_back() {
        let cloud = FakeCloud::new().fail_region_discovery(network_fault("DescribeRegions"));
        let directory = directory(cloud.clone(), Vec::new());

        let err = directory.resolve_regions().await.unwrap_err();
        assert!(matches!(err, FleetError::RegionDiscovery(_)));

        let regions = directory.resolve_or_fallback().await;
        assert_eq!(regions.len(), FALLBACK_REGIONS.len());
        assert_eq!(cloud.describe_regions_calls(), 2);
    }
}

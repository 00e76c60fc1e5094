use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_ec2::Client;
use aws_sdk_ec2::config::Region;
use tracing::{debug, info};

use super::{Ec2Api, api_error};
use crate::error::ApiError;
use crate::model::{InstanceRecord, StatusChecks};

pub struct Ec2Client {
    pub(super) client: Client,
    pub(super) region: String,
}

impl Ec2Client {
    /// Builds a region-bound client on top of the shared session configuration.
    ///
    /// Credentials and retry settings come from `sdk_config`; only the region
    /// is overridden, so building a client performs no I/O.
    pub fn from_sdk_config(sdk_config: &SdkConfig, region: &str) -> Self {
        let config = aws_sdk_ec2::config::Builder::from(sdk_config)
            .region(Region::new(region.to_string()))
            .build();

        debug!(region = %region, "EC2 client created");

        Self {
            client: Client::from_conf(config),
            region: region.to_string(),
        }
    }
}

#[async_trait]
impl Ec2Api for Ec2Client {
    fn region(&self) -> &str {
        &self.region
    }

    async fn describe_regions(&self) -> Result<Vec<String>, ApiError> {
        let start_time = std::time::Instant::now();

        let response = self
            .client
            .describe_regions()
            .send()
            .await
            .map_err(|e| api_error("DescribeRegions", e))?;

        let regions: Vec<String> = response
            .regions()
            .iter()
            .filter_map(|r| r.region_name())
            .map(str::to_string)
            .collect();

        info!(
            region = %self.region,
            region_count = regions.len(),
            response_time_ms = start_time.elapsed().as_millis(),
            "Discovered enabled regions"
        );

        Ok(regions)
    }

    async fn describe_instances(&self) -> Result<Vec<InstanceRecord>, ApiError> {
        self.list_instances().await
    }

    async fn start_instance(&self, instance_id: &str) -> Result<(), ApiError> {
        info!(
            instance_id = %instance_id,
            region = %self.region,
            api_action = "StartInstances",
            "Sending start request to AWS EC2 API"
        );

        self.client
            .start_instances()
            .instance_ids(instance_id)
            .send()
            .await
            .map_err(|e| api_error("StartInstances", e))?;

        Ok(())
    }

    async fn stop_instance(&self, instance_id: &str) -> Result<(), ApiError> {
        info!(
            instance_id = %instance_id,
            region = %self.region,
            api_action = "StopInstances",
            "Sending stop request to AWS EC2 API"
        );

        self.client
            .stop_instances()
            .instance_ids(instance_id)
            .send()
            .await
            .map_err(|e| api_error("StopInstances", e))?;

        Ok(())
    }

    async fn reboot_instance(&self, instance_id: &str) -> Result<(), ApiError> {
        info!(
            instance_id = %instance_id,
            region = %self.region,
            api_action = "RebootInstances",
            "Sending reboot request to AWS EC2 API"
        );

        self.client
            .reboot_instances()
            .instance_ids(instance_id)
            .send()
            .await
            .map_err(|e| api_error("RebootInstances", e))?;

        Ok(())
    }

    async fn describe_status_checks(
        &self,
        instance_id: &str,
    ) -> Result<Option<StatusChecks>, ApiError> {
        self.status_checks(instance_id).await
    }
}

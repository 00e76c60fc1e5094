use aws_sdk_ec2::types::{InstanceStatus, InstanceStatusSummary};
use tracing::debug;

use super::{Ec2Client, api_error};
use crate::error::ApiError;
use crate::model::{CheckStatus, InstanceState, StatusChecks};

impl Ec2Client {
    pub(super) async fn status_checks(
        &self,
        instance_id: &str,
    ) -> Result<Option<StatusChecks>, ApiError> {
        // Without include_all_instances EC2 omits non-running instances, which
        // surfaces as "no status data" to the caller.
        let response = self
            .client
            .describe_instance_status()
            .instance_ids(instance_id)
            .send()
            .await
            .map_err(|e| api_error("DescribeInstanceStatus", e))?;

        let checks = response.instance_statuses().first().map(to_status_checks);

        debug!(
            instance_id = %instance_id,
            region = %self.region,
            checks = ?checks,
            "Received DescribeInstanceStatus response"
        );

        Ok(checks)
    }
}

fn to_status_checks(status: &InstanceStatus) -> StatusChecks {
    StatusChecks {
        instance_state: status
            .instance_state()
            .and_then(|s| s.name())
            .map(|name| InstanceState::from_provider(name.as_str()))
            .unwrap_or(InstanceState::Unknown),
        system_status: summary_status(status.system_status()),
        instance_status: summary_status(status.instance_status()),
    }
}

fn summary_status(summary: Option<&InstanceStatusSummary>) -> CheckStatus {
    summary
        .and_then(|s| s.status())
        .map(|s| CheckStatus::from_provider(s.as_str()))
        .unwrap_or(CheckStatus::Unknown)
}

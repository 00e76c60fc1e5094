use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{FleetError, Result};
use crate::model::{InstanceState, StatusChecks};
use crate::pool::ClientPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    Start,
    Stop,
    Reboot,
}

impl LifecycleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Reboot => "reboot",
        }
    }

    /// Local state applied once EC2 accepts the command.
    pub fn optimistic_state(&self) -> InstanceState {
        match self {
            Self::Start => InstanceState::Pending,
            Self::Stop => InstanceState::Stopping,
            Self::Reboot => InstanceState::Rebooting,
        }
    }
}

impl fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sends control commands to single instances.
///
/// Every command returns as soon as EC2 accepts it; completion is not awaited.
pub struct LifecycleController {
    pool: Arc<ClientPool>,
}

impl LifecycleController {
    pub fn new(pool: Arc<ClientPool>) -> Self {
        Self { pool }
    }

    pub async fn start(&self, instance_id: &str, region: &str) -> Result<()> {
        self.execute(LifecycleAction::Start, instance_id, region).await
    }

    pub async fn stop(&self, instance_id: &str, region: &str) -> Result<()> {
        self.execute(LifecycleAction::Stop, instance_id, region).await
    }

    pub async fn reboot(&self, instance_id: &str, region: &str) -> Result<()> {
        self.execute(LifecycleAction::Reboot, instance_id, region).await
    }

    pub async fn execute(&self, action: LifecycleAction, instance_id: &str, region: &str) -> Result<()> {
        let client = self.pool.client_for(region);

        let outcome = match action {
            LifecycleAction::Start => client.start_instance(instance_id).await,
            LifecycleAction::Stop => client.stop_instance(instance_id).await,
            LifecycleAction::Reboot => client.reboot_instance(instance_id).await,
        };

        outcome.map_err(|source| FleetError::LifecycleCommand {
            instance_id: instance_id.to_string(),
            action: action.as_str(),
            source,
        })?;

        info!(
            instance_id = %instance_id,
            region = %region,
            action = %action,
            "Lifecycle command accepted"
        );

        Ok(())
    }

    /// Status checks for one instance; all `unknown` when EC2 has none.
    pub async fn get_status_checks(&self, instance_id: &str, region: &str) -> Result<StatusChecks> {
        let checks = self
            .pool
            .client_for(region)
            .describe_status_checks(instance_id)
            .await
            .map_err(|source| FleetError::StatusCheck {
                instance_id: instance_id.to_string(),
                source,
            })?;

        if checks.is_none() {
            debug!(
                instance_id = %instance_id,
                region = %region,
                "No status check data for instance"
            );
        }

        Ok(checks.unwrap_or_else(StatusChecks::unknown))
    }
}

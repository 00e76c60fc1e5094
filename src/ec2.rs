mod client;
mod inventory;
mod status;

pub use client::Ec2Client;
pub use inventory::{format_launch_time, to_instance_record};

use async_trait::async_trait;
use aws_sdk_ec2::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};

use crate::error::ApiError;
use crate::model::{InstanceRecord, StatusChecks};

/// The slice of the EC2 API the fleet engine depends on, bound to one region.
#[async_trait]
pub trait Ec2Api: Send + Sync {
    fn region(&self) -> &str;

    /// Regions enabled for the account.
    async fn describe_regions(&self) -> Result<Vec<String>, ApiError>;

    /// Every instance in the region, normalized.
    async fn describe_instances(&self) -> Result<Vec<InstanceRecord>, ApiError>;

    async fn start_instance(&self, instance_id: &str) -> Result<(), ApiError>;

    async fn stop_instance(&self, instance_id: &str) -> Result<(), ApiError>;

    async fn reboot_instance(&self, instance_id: &str) -> Result<(), ApiError>;

    /// `None` when EC2 has no status entry for the instance.
    async fn describe_status_checks(&self, instance_id: &str)
    -> Result<Option<StatusChecks>, ApiError>;
}

/// Flattens an SDK error into an [`ApiError`], keeping the service error code.
pub(crate) fn api_error<E, R>(operation: &'static str, err: SdkError<E, R>) -> ApiError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug,
{
    let code = err.code().map(str::to_string);
    let message = err
        .message()
        .map(str::to_string)
        .unwrap_or_else(|| DisplayErrorContext(&err).to_string());

    ApiError::new(operation, code, message)
}

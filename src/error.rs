//! Error taxonomy for the fleet engine.

use std::path::PathBuf;
use thiserror::Error;

// EC2 error codes that mean the caller cannot use the region or instance at all,
// as opposed to a fault that may clear on retry.
const ACCESS_DENIED_CODES: &[&str] = &[
    "UnauthorizedOperation",
    "AuthFailure",
    "OptInRequired",
    "AccessDenied",
    "AccessDeniedException",
];

/// A failed call to the provider API.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{operation} failed: {message}")]
pub struct ApiError {
    pub operation: &'static str,
    pub code: Option<String>,
    pub message: String,
}

impl ApiError {
    pub fn new(operation: &'static str, code: Option<String>, message: impl Into<String>) -> Self {
        Self {
            operation,
            code,
            message: message.into(),
        }
    }

    pub fn is_access_denied(&self) -> bool {
        self.code
            .as_deref()
            .is_some_and(|code| ACCESS_DENIED_CODES.contains(&code))
    }
}

#[derive(Error, Debug)]
pub enum FleetError {
    #[error("AWS credentials unavailable: {0}")]
    Credential(String),

    #[error("Failed to discover regions: {0}")]
    RegionDiscovery(#[source] ApiError),

    #[error("[{region}] inventory scan failed: {source}")]
    RegionScan {
        region: String,
        #[source]
        source: ApiError,
    },

    #[error("Failed to {action} instance {instance_id}: {source}")]
    LifecycleCommand {
        instance_id: String,
        action: &'static str,
        #[source]
        source: ApiError,
    },

    #[error("Failed to get status checks for instance {instance_id}: {source}")]
    StatusCheck {
        instance_id: String,
        #[source]
        source: ApiError,
    },

    #[error("Cache I/O failed for {}: {source}", path.display())]
    CacheIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, FleetError>;

//! Canonical fleet records shared by the scanner, engine and cache.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Placeholder for any field the provider left unset.
pub const NOT_AVAILABLE: &str = "N/A";

fn not_available() -> String {
    NOT_AVAILABLE.to_string()
}

/// Lifecycle state of an instance.
///
/// `Rebooting` is never reported by EC2; it only exists locally while a reboot
/// watch is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceState {
    Pending,
    Running,
    Stopping,
    Stopped,
    Rebooting,
    Terminated,
    #[serde(other)]
    Unknown,
}

impl InstanceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Rebooting => "rebooting",
            Self::Terminated => "terminated",
            Self::Unknown => "unknown",
        }
    }

    /// Maps an EC2 state name (`running`, `shutting-down`, ...) onto the local set.
    pub fn from_provider(name: &str) -> Self {
        match name {
            "pending" => Self::Pending,
            "running" => Self::Running,
            "stopping" | "shutting-down" => Self::Stopping,
            "stopped" => Self::Stopped,
            "terminated" => Self::Terminated,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One instance as seen by the fleet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub id: String,
    pub region: String,
    #[serde(default = "not_available")]
    pub name: String,
    #[serde(rename = "type", default = "not_available")]
    pub instance_type: String,
    #[serde(default = "not_available")]
    pub public_ip: String,
    #[serde(default = "not_available")]
    pub private_ip: String,
    #[serde(default = "unknown_state")]
    pub state: InstanceState,
    #[serde(default = "not_available")]
    pub launch_time: String,
}

fn unknown_state() -> InstanceState {
    InstanceState::Unknown
}

impl InstanceRecord {
    /// A record with every descriptive field set to its placeholder.
    pub fn new(id: impl Into<String>, region: impl Into<String>, state: InstanceState) -> Self {
        Self {
            id: id.into(),
            region: region.into(),
            name: not_available(),
            instance_type: not_available(),
            public_ip: not_available(),
            private_ip: not_available(),
            state,
            launch_time: not_available(),
        }
    }
}

/// Point-in-time inventory across all scanned regions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetSnapshot {
    /// `None` for snapshots restored from caches that predate timestamps.
    #[serde(default)]
    pub scanned_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub instances: Vec<InstanceRecord>,
}

impl FleetSnapshot {
    pub fn new(instances: Vec<InstanceRecord>) -> Self {
        Self {
            scanned_at: Some(Utc::now()),
            instances,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn get(&self, instance_id: &str) -> Option<&InstanceRecord> {
        self.instances.iter().find(|i| i.id == instance_id)
    }
}

/// Result of a single EC2 status check (system or instance reachability).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckStatus {
    Ok,
    Impaired,
    Initializing,
    InsufficientData,
    NotApplicable,
    #[serde(other)]
    Unknown,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Impaired => "impaired",
            Self::Initializing => "initializing",
            Self::InsufficientData => "insufficient-data",
            Self::NotApplicable => "not-applicable",
            Self::Unknown => "unknown",
        }
    }

    pub fn from_provider(value: &str) -> Self {
        match value {
            "ok" => Self::Ok,
            "impaired" => Self::Impaired,
            "initializing" => Self::Initializing,
            "insufficient-data" => Self::InsufficientData,
            "not-applicable" => Self::NotApplicable,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The three independent health signals EC2 reports for an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChecks {
    pub instance_state: InstanceState,
    pub system_status: CheckStatus,
    pub instance_status: CheckStatus,
}

impl StatusChecks {
    /// Reported when EC2 has no status entry for the instance (e.g. it is stopped).
    pub fn unknown() -> Self {
        Self {
            instance_state: InstanceState::Unknown,
            system_status: CheckStatus::Unknown,
            instance_status: CheckStatus::Unknown,
        }
    }

    /// Running with both reachability checks passing.
    pub fn is_healthy(&self) -> bool {
        self.instance_state == InstanceState::Running
            && self.system_status == CheckStatus::Ok
            && self.instance_status == CheckStatus::Ok
    }
}

/// Active reboot watch as exposed to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RebootWatch {
    pub instance_id: String,
    pub region: String,
    pub attempts_elapsed: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_from_provider() {
        assert_eq!(InstanceState::from_provider("running"), InstanceState::Running);
        assert_eq!(
            InstanceState::from_provider("shutting-down"),
            InstanceState::Stopping
        );
        assert_eq!(InstanceState::from_provider("hibernating"), InstanceState::Unknown);
        // EC2 never reports the synthetic state
        assert_eq!(InstanceState::from_provider("rebooting"), InstanceState::Unknown);
    }

    #[test]
    fn test_healthy_requires_all_three_signals() {
        let healthy = StatusChecks {
            instance_state: InstanceState::Running,
            system_status: CheckStatus::Ok,
            instance_status: CheckStatus::Ok,
        };
        assert!(healthy.is_healthy());

        let initializing = StatusChecks {
            instance_status: CheckStatus::Initializing,
            ..healthy
        };
        assert!(!initializing.is_healthy());

        let pending = StatusChecks {
            instance_state: InstanceState::Pending,
            ..healthy
        };
        assert!(!pending.is_healthy());

        assert!(!StatusChecks::unknown().is_healthy());
    }

    #[test]
    fn test_record_missing_fields_default_to_placeholder() {
        let record: InstanceRecord =
            serde_json::from_str(r#"{"id":"i-1","region":"us-east-1","extra":42}"#).unwrap();

        assert_eq!(record.name, NOT_AVAILABLE);
        assert_eq!(record.public_ip, NOT_AVAILABLE);
        assert_eq!(record.launch_time, NOT_AVAILABLE);
        assert_eq!(record.state, InstanceState::Unknown);
    }

    #[test]
    fn test_unrecognised_state_deserializes_as_unknown() {
        let record: InstanceRecord =
            serde_json::from_str(r#"{"id":"i-1","region":"r1","state":"hibernated"}"#).unwrap();
        assert_eq!(record.state, InstanceState::Unknown);
    }

    #[test]
    fn test_check_status_round_trips_provider_names() {
        for name in ["ok", "impaired", "initializing", "insufficient-data", "not-applicable"] {
            assert_eq!(CheckStatus::from_provider(name).as_str(), name);
        }
        assert_eq!(CheckStatus::from_provider("Ok"), CheckStatus::Unknown);
    }
}

//! Operator-visible event stream.
//!
//! Every event is written to the structured log and broadcast to subscribers
//! such as the CLI or a UI.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl fmt::Display for EventLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FleetEvent {
    pub at: DateTime<Utc>,
    pub level: EventLevel,
    pub message: String,
    pub instance_id: Option<String>,
    pub region: Option<String>,
}

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<FleetEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FleetEvent> {
        self.sender.subscribe()
    }

    pub fn fleet(&self, level: EventLevel, message: impl Into<String>) {
        self.emit(level, message.into(), None, None);
    }

    pub fn instance(
        &self,
        level: EventLevel,
        instance_id: &str,
        region: &str,
        message: impl Into<String>,
    ) {
        self.emit(
            level,
            message.into(),
            Some(instance_id.to_string()),
            Some(region.to_string()),
        );
    }

    fn emit(
        &self,
        level: EventLevel,
        message: String,
        instance_id: Option<String>,
        region: Option<String>,
    ) {
        let id = instance_id.as_deref().unwrap_or("-");
        let rg = region.as_deref().unwrap_or("-");
        match level {
            EventLevel::Info => info!(instance_id = id, region = rg, "{}", message),
            EventLevel::Success => {
                info!(instance_id = id, region = rg, outcome = "success", "{}", message)
            }
            EventLevel::Warning => warn!(instance_id = id, region = rg, "{}", message),
            EventLevel::Error => error!(instance_id = id, region = rg, "{}", message),
        }

        // No subscribers is fine.
        let _ = self.sender.send(FleetEvent {
            at: Utc::now(),
            level,
            message,
            instance_id,
            region,
        });
    }
}

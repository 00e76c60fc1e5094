//! In-memory EC2 provider for engine tests.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::ec2::Ec2Api;
use crate::error::ApiError;
use crate::model::{CheckStatus, InstanceRecord, InstanceState, StatusChecks};
use crate::pool::ClientFactory;

type StatusReply = Result<Option<StatusChecks>, ApiError>;

#[derive(Default)]
struct CloudState {
    regions: Vec<String>,
    regions_error: Option<ApiError>,
    instances: HashMap<String, Result<Vec<InstanceRecord>, ApiError>>,
    scan_delays: HashMap<String, Duration>,
    panicking_regions: Vec<String>,
    status_replies: HashMap<String, VecDeque<StatusReply>>,
    rejections: HashMap<(&'static str, String), ApiError>,
    commands: Vec<(&'static str, String, String)>,
    describe_regions_calls: usize,
    describe_instances_calls: usize,
    status_calls: usize,
}

#[derive(Clone, Default)]
pub struct FakeCloud {
    state: Arc<Mutex<CloudState>>,
}

impl FakeCloud {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, CloudState> {
        self.state.lock().unwrap()
    }

    pub fn with_regions(self, regions: &[&str]) -> Self {
        self.state().regions = regions.iter().map(|r| r.to_string()).collect();
        self
    }

    pub fn fail_region_discovery(self, err: ApiError) -> Self {
        self.state().regions_error = Some(err);
        self
    }

    pub fn with_instances(self, region: &str, instances: Vec<InstanceRecord>) -> Self {
        self.state()
            .instances
            .insert(region.to_string(), Ok(instances));
        self
    }

    pub fn fail_region(self, region: &str, err: ApiError) -> Self {
        self.state().instances.insert(region.to_string(), Err(err));
        self
    }

    pub fn panic_in_region(self, region: &str) -> Self {
        self.state().panicking_regions.push(region.to_string());
        self
    }

    pub fn delay_region(self, region: &str, delay: Duration) -> Self {
        self.state().scan_delays.insert(region.to_string(), delay);
        self
    }

    /// Replies are consumed in order; the last one repeats forever.
    pub fn script_status(self, instance_id: &str, replies: Vec<StatusReply>) -> Self {
        self.state()
            .status_replies
            .insert(instance_id.to_string(), replies.into());
        self
    }

    pub fn reject(self, action: &'static str, instance_id: &str, err: ApiError) -> Self {
        self.state()
            .rejections
            .insert((action, instance_id.to_string()), err);
        self
    }

    pub fn set_instances(&self, region: &str, instances: Vec<InstanceRecord>) {
        self.state()
            .instances
            .insert(region.to_string(), Ok(instances));
    }

    pub fn commands(&self) -> Vec<(&'static str, String, String)> {
        self.state().commands.clone()
    }

    pub fn describe_regions_calls(&self) -> usize {
        self.state().describe_regions_calls
    }

    pub fn describe_instances_calls(&self) -> usize {
        self.state().describe_instances_calls
    }

    pub fn status_calls(&self) -> usize {
        self.state().status_calls
    }

    fn command(&self, action: &'static str, instance_id: &str, region: &str) -> Result<(), ApiError> {
        let mut state = self.state();
        if let Some(err) = state.rejections.get(&(action, instance_id.to_string())) {
            return Err(err.clone());
        }
        state
            .commands
            .push((action, instance_id.to_string(), region.to_string()));
        Ok(())
    }
}

pub struct FakeEc2 {
    region: String,
    cloud: FakeCloud,
}

#[async_trait]
impl Ec2Api for FakeEc2 {
    fn region(&self) -> &str {
        &self.region
    }

    async fn describe_regions(&self) -> Result<Vec<String>, ApiError> {
        let mut state = self.cloud.state();
        state.describe_regions_calls += 1;
        match &state.regions_error {
            Some(err) => Err(err.clone()),
            None => Ok(state.regions.clone()),
        }
    }

    async fn describe_instances(&self) -> Result<Vec<InstanceRecord>, ApiError> {
        let (delay, panics) = {
            let mut state = self.cloud.state();
            state.describe_instances_calls += 1;
            (
                state.scan_delays.get(&self.region).copied(),
                state.panicking_regions.contains(&self.region),
            )
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if panics {
            panic!("simulated scanner crash in {}", self.region);
        }

        self.cloud
            .state()
            .instances
            .get(&self.region)
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn start_instance(&self, instance_id: &str) -> Result<(), ApiError> {
        self.cloud.command("start", instance_id, &self.region)
    }

    async fn stop_instance(&self, instance_id: &str) -> Result<(), ApiError> {
        self.cloud.command("stop", instance_id, &self.region)
    }

    async fn reboot_instance(&self, instance_id: &str) -> Result<(), ApiError> {
        self.cloud.command("reboot", instance_id, &self.region)
    }

    async fn describe_status_checks(&self, instance_id: &str) -> StatusReply {
        let mut state = self.cloud.state();
        state.status_calls += 1;
        let Some(replies) = state.status_replies.get_mut(instance_id) else {
            return Ok(None);
        };
        if replies.len() > 1 {
            replies.pop_front().unwrap_or(Ok(None))
        } else {
            replies.front().cloned().unwrap_or(Ok(None))
        }
    }
}

pub struct FakeFactory {
    cloud: FakeCloud,
    created: AtomicUsize,
}

impl FakeFactory {
    pub fn new(cloud: FakeCloud) -> Self {
        Self {
            cloud,
            created: AtomicUsize::new(0),
        }
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl ClientFactory for FakeFactory {
    fn create(&self, region: &str) -> Arc<dyn Ec2Api> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Arc::new(FakeEc2 {
            region: region.to_string(),
            cloud: self.cloud.clone(),
        })
    }
}

pub fn record(id: &str, region: &str, state: InstanceState) -> InstanceRecord {
    InstanceRecord::new(id, region, state)
}

pub fn checks(state: InstanceState, system: CheckStatus, instance: CheckStatus) -> StatusChecks {
    StatusChecks {
        instance_state: state,
        system_status: system,
        instance_status: instance,
    }
}

pub fn access_denied(operation: &'static str) -> ApiError {
    ApiError::new(
        operation,
        Some("UnauthorizedOperation".to_string()),
        "You are not authorized to perform this operation.",
    )
}

pub fn network_fault(operation: &'static str) -> ApiError {
    ApiError::new(operation, None, "dispatch failure: connection reset")
}

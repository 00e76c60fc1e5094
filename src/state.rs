use std::sync::RwLock;
use tracing::debug;

use crate::model::{FleetSnapshot, InstanceState};

/// The engine's local view of the fleet.
///
/// Two writers race on it: fresh scans and optimistic lifecycle transitions.
/// The synthetic `rebooting` state wins over scan data while a watch exists.
#[derive(Default)]
pub struct FleetState {
    snapshot: RwLock<FleetSnapshot>,
}

impl FleetState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current fleet.
    pub fn snapshot(&self) -> FleetSnapshot {
        self.snapshot.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn state_of(&self, instance_id: &str) -> Option<InstanceState> {
        self.snapshot
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(instance_id)
            .map(|i| i.state)
    }

    /// Replaces the fleet with a freshly scanned snapshot. Instances for which
    /// `is_rebooting` holds keep the synthetic state regardless of what was
    /// scanned. Returns the number of overridden instances.
    pub fn replace(&self, mut snapshot: FleetSnapshot, is_rebooting: impl Fn(&str) -> bool) -> usize {
        let mut overridden = 0;
        for instance in snapshot.instances.iter_mut() {
            if is_rebooting(&instance.id) && instance.state != InstanceState::Rebooting {
                debug!(
                    instance_id = %instance.id,
                    scanned_state = %instance.state,
                    "Keeping synthetic rebooting state over scanned state"
                );
                instance.state = InstanceState::Rebooting;
                overridden += 1;
            }
        }

        *self.snapshot.write().unwrap_or_else(|e| e.into_inner()) = snapshot;
        overridden
    }

    /// Sets the state of one instance. Returns false when the id is unknown.
    pub fn set_state(&self, instance_id: &str, state: InstanceState) -> bool {
        self.update(instance_id, |_| Some(state))
    }

    /// Sets the state only if the instance is currently in `expected`.
    pub fn transition(&self, instance_id: &str, expected: InstanceState, next: InstanceState) -> bool {
        self.update(instance_id, |current| (current == expected).then_some(next))
    }

    fn update(&self, instance_id: &str, next: impl FnOnce(InstanceState) -> Option<InstanceState>) -> bool {
        let mut snapshot = self.snapshot.write().unwrap_or_else(|e| e.into_inner());
        let Some(instance) = snapshot.instances.iter_mut().find(|i| i.id == instance_id) else {
            return false;
        };

        match next(instance.state) {
            Some(state) => {
                debug!(
                    instance_id = %instance_id,
                    from = %instance.state,
                    to = %state,
                    "Local instance state updated"
                );
                instance.state = state;
                true
            }
            None => false,
        }
    }
}

//! Plain-text rendering for the command line.

use std::collections::BTreeSet;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::model::{InstanceRecord, StatusChecks};

#[derive(Tabled)]
struct InstanceRow {
    #[tabled(rename = "")]
    pin: &'static str,
    #[tabled(rename = "REGION")]
    region: String,
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "INSTANCE ID")]
    id: String,
    #[tabled(rename = "STATE")]
    state: &'static str,
    #[tabled(rename = "TYPE")]
    instance_type: String,
    #[tabled(rename = "PUBLIC IP")]
    public_ip: String,
    #[tabled(rename = "PRIVATE IP")]
    private_ip: String,
    #[tabled(rename = "LAUNCHED")]
    launch_time: String,
}

impl InstanceRow {
    fn new(instance: &InstanceRecord, pinned: bool) -> Self {
        Self {
            pin: if pinned { "*" } else { "" },
            region: instance.region.clone(),
            name: instance.name.clone(),
            id: instance.id.clone(),
            state: instance.state.as_str(),
            instance_type: instance.instance_type.clone(),
            public_ip: instance.public_ip.clone(),
            private_ip: instance.private_ip.clone(),
            launch_time: instance.launch_time.clone(),
        }
    }
}

#[derive(Tabled)]
struct CheckRow {
    #[tabled(rename = "INSTANCE ID")]
    id: String,
    #[tabled(rename = "STATE")]
    state: &'static str,
    #[tabled(rename = "SYSTEM")]
    system: &'static str,
    #[tabled(rename = "INSTANCE")]
    instance: &'static str,
}

pub fn render_instances(instances: &[InstanceRecord], pinned: &BTreeSet<String>) -> String {
    if instances.is_empty() {
        return "No instances found.".to_string();
    }

    let rows: Vec<_> = instances
        .iter()
        .map(|i| InstanceRow::new(i, pinned.contains(&i.id)))
        .collect();

    let mut table = Table::new(&rows);
    table.with(Style::blank());
    table.to_string()
}

pub fn render_status_checks(instance_id: &str, checks: &StatusChecks) -> String {
    let row = CheckRow {
        id: instance_id.to_string(),
        state: checks.instance_state.as_str(),
        system: checks.system_status.as_str(),
        instance: checks.instance_status.as_str(),
    };

    let mut table = Table::new([row]);
    table.with(Style::blank());
    table.to_string()
}

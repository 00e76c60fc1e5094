use clap::ValueEnum;
use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::model::InstanceRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SortKey {
    Region,
    Name,
    Id,
    State,
    Type,
    LaunchTime,
}

/// How a snapshot is filtered and ordered for display.
#[derive(Debug, Clone, Default)]
pub struct FleetQuery {
    /// `None` shows every region.
    pub region: Option<String>,
    pub sort: Option<SortKey>,
    pub descending: bool,
}

impl FleetQuery {
    /// Filters by region, then lists pinned instances first in scan order,
    /// followed by the rest sorted by the requested key.
    pub fn apply(&self, instances: &[InstanceRecord], pinned: &BTreeSet<String>) -> Vec<InstanceRecord> {
        let (mut pinned_rows, mut rest): (Vec<_>, Vec<_>) = instances
            .iter()
            .filter(|i| self.region.as_deref().is_none_or(|r| i.region == r))
            .cloned()
            .partition(|i| pinned.contains(&i.id));

        if let Some(key) = self.sort {
            rest.sort_by(|a, b| {
                let ordering = compare(a, b, key);
                if self.descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            });
        }

        pinned_rows.append(&mut rest);
        pinned_rows
    }
}

fn compare(a: &InstanceRecord, b: &InstanceRecord, key: SortKey) -> Ordering {
    match key {
        SortKey::Region => a.region.cmp(&b.region),
        SortKey::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
        SortKey::Id => a.id.cmp(&b.id),
        SortKey::State => a.state.as_str().cmp(b.state.as_str()),
        SortKey::Type => a.instance_type.cmp(&b.instance_type),
        // "YYYY-MM-DD HH:MM:SS" sorts lexically
        SortKey::LaunchTime => a.launch_time.cmp(&b.launch_time),
    }
}

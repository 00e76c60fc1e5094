use aws_sdk_ec2::primitives::DateTime as AwsDateTime;
use aws_sdk_ec2::types::{Instance, Tag};
use chrono::{DateTime, Local, TimeZone, Utc};
use tracing::debug;

use super::{Ec2Client, api_error};
use crate::error::ApiError;
use crate::model::{InstanceRecord, InstanceState, NOT_AVAILABLE};

const TAG_NAME: &str = "Name";
const LAUNCH_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

impl Ec2Client {
    pub(super) async fn list_instances(&self) -> Result<Vec<InstanceRecord>, ApiError> {
        let mut pages = self.client.describe_instances().into_paginator().send();
        let mut records = Vec::new();
        let mut page_count = 0;

        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| api_error("DescribeInstances", e))?;
            page_count += 1;

            records.extend(
                page.reservations()
                    .iter()
                    .flat_map(|r| r.instances())
                    .filter_map(|i| to_instance_record(i, &self.region)),
            );
        }

        debug!(
            region = %self.region,
            page_count = page_count,
            instance_count = records.len(),
            "Received DescribeInstances response"
        );

        Ok(records)
    }
}

/// Normalizes an SDK instance into the fleet record. Entries without an id are
/// dropped.
pub fn to_instance_record(instance: &Instance, region: &str) -> Option<InstanceRecord> {
    let id = instance.instance_id()?;

    let state = instance
        .state()
        .and_then(|s| s.name())
        .map(|name| InstanceState::from_provider(name.as_str()))
        .unwrap_or(InstanceState::Unknown);

    Some(InstanceRecord {
        id: id.to_string(),
        region: region.to_string(),
        name: find_tag_value(instance.tags(), TAG_NAME).unwrap_or_else(|| NOT_AVAILABLE.into()),
        instance_type: instance
            .instance_type()
            .map(|t| t.as_str())
            .unwrap_or(NOT_AVAILABLE)
            .to_string(),
        public_ip: instance
            .public_ip_address()
            .unwrap_or(NOT_AVAILABLE)
            .to_string(),
        private_ip: instance
            .private_ip_address()
            .unwrap_or(NOT_AVAILABLE)
            .to_string(),
        state,
        launch_time: format_launch_time(instance.launch_time()),
    })
}

fn find_tag_value(tags: &[Tag], key: &str) -> Option<String> {
    tags.iter()
        .find(|tag| tag.key() == Some(key))
        .and_then(|tag| tag.value())
        .map(str::to_string)
}

/// Formats a launch time in the local timezone, or `N/A` when absent.
pub fn format_launch_time(launch_time: Option<&AwsDateTime>) -> String {
    format_launch_time_in(launch_time, &Local)
}

fn format_launch_time_in<Tz>(launch_time: Option<&AwsDateTime>, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    launch_time
        .and_then(|t| DateTime::<Utc>::from_timestamp(t.secs(), t.subsec_nanos()))
        .map(|t| t.with_timezone(tz).format(LAUNCH_TIME_FORMAT).to_string())
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

//! Quota timeouts derived from the provider activity log.
//!
//! A capacity update that the provider accepts may still fail asynchronously when the provider
//! cannot allocate the machines. Such failures only show up in the activity log, so the
//! snapshots of pools are refreshed from it before each reconciliation.
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt};
use serde::Deserialize;

use crate::Map;
use crate::common::timeutils::{add_duration, sub_duration};
use crate::gateway::{ActivityEvent, CallLimits, CloudGateway, GatewayOperation};
use crate::scaleset::{QuotaTimeout, ScaleSetSnapshot};

/// Provider error codes that mean that no more capacity can be allocated for now.
pub const QUOTA_ERROR_CODES: &[&str] = &[
    "QuotaExceeded",
    "OperationNotAllowed",
    "SkuNotAvailable",
    "AllocationFailed",
];

#[derive(Deserialize)]
struct StatusMessage {
    error: ProviderError,
}

#[derive(Deserialize)]
struct ProviderError {
    code: String,
    #[serde(default)]
    message: String,
}

/// Returns the provider error carried by the status message of `event`, if it is quota related.
fn quota_error(event: &ActivityEvent) -> Option<ProviderError> {
    let message = event.status_message.as_deref()?;
    match serde_json::from_str::<StatusMessage>(message) {
        Ok(StatusMessage { error }) if QUOTA_ERROR_CODES.contains(&error.code.as_str()) => {
            Some(error)
        }
        Ok(_) => None,
        Err(error) => {
            log::trace!(
                "Cannot parse status message of {}: {error}",
                event.resource_name
            );
            None
        }
    }
}

/// Finds the most recent quota failure of `pool_name` and derives its timeout.
///
/// The pool is blocked for `cooldown` after the failure has happened.
pub fn derive_quota_timeout(
    events: &[ActivityEvent],
    pool_name: &str,
    cooldown: Duration,
) -> Option<QuotaTimeout> {
    events
        .iter()
        .filter(|event| event.resource_name == pool_name && event.is_failed())
        .filter_map(|event| quota_error(event).map(|error| (event.timestamp, error)))
        .max_by_key(|(timestamp, _)| *timestamp)
        .map(|(timestamp, error)| QuotaTimeout {
            until: add_duration(timestamp, cooldown),
            reason: format!("{}: {}", error.code, error.message),
        })
}

/// Attaches quota timeouts found in the recent activity of each resource group to `snapshots`.
///
/// Activity is listed once per resource group, covering the last `cooldown` before `now`. A
/// timeout that a snapshot already has is kept if it ends later than the derived one.
pub async fn refresh_timeouts(
    gateway: &dyn CloudGateway,
    snapshots: Vec<ScaleSetSnapshot>,
    limits: &CallLimits,
    cooldown: Duration,
    now: DateTime<Utc>,
) -> crate::Result<Vec<ScaleSetSnapshot>> {
    let since = sub_duration(now, cooldown);
    let mut resource_groups: Vec<&str> = Vec::new();
    for snapshot in &snapshots {
        if !resource_groups.contains(&snapshot.resource_group()) {
            resource_groups.push(snapshot.resource_group());
        }
    }

    let requests = resource_groups.into_iter().map(|resource_group| {
        let request = gateway.list_recent_activity(resource_group, since);
        async move {
            let events = limits
                .call(
                    resource_group,
                    GatewayOperation::ListRecentActivity,
                    request,
                )
                .await?;
            log::debug!(
                "Resource group {resource_group} has {} recent activity event(s)",
                events.len()
            );
            Ok::<_, crate::Error>((resource_group.to_string(), events))
        }
    });
    let activity: Map<String, Vec<ActivityEvent>> = futures::stream::iter(requests)
        .buffered(limits.max_concurrent())
        .try_collect()
        .await?;

    Ok(snapshots
        .into_iter()
        .map(|snapshot| {
            let Some(events) = activity.get(snapshot.resource_group()) else {
                return snapshot;
            };
            let Some(timeout) = derive_quota_timeout(events, snapshot.name(), cooldown) else {
                return snapshot;
            };
            match snapshot.timeout_until() {
                Some(until) if until >= timeout.until => snapshot,
                _ => {
                    if timeout.until > now {
                        log::info!(
                            "Scale set {} is out of quota until {}: {}",
                            snapshot.pool_id(),
                            timeout.until,
                            timeout.reason
                        );
                    }
                    snapshot.with_timeout(timeout.until, timeout.reason)
                }
            }
        })
        .collect())
}

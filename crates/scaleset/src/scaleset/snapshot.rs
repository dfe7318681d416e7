use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Window during which scale-up of a pool is known to fail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaTimeout {
    pub until: DateTime<Utc>,
    pub reason: String,
}

/// Point-in-time view of a single provider pool.
///
/// Snapshots are rebuilt from provider state on every reconciliation and never change afterwards.
/// Recording a timeout produces a new snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaleSetSnapshot {
    region: String,
    resource_group: String,
    name: String,
    instance_type: String,
    capacity: u64,
    provisioning_state: String,
    timeout: Option<QuotaTimeout>,
}

impl ScaleSetSnapshot {
    pub fn new(
        region: impl Into<String>,
        resource_group: impl Into<String>,
        name: impl Into<String>,
        instance_type: impl Into<String>,
        capacity: u64,
        provisioning_state: impl Into<String>,
    ) -> Self {
        Self {
            region: region.into(),
            resource_group: resource_group.into(),
            name: name.into(),
            instance_type: instance_type.into(),
            capacity,
            provisioning_state: provisioning_state.into(),
            timeout: None,
        }
    }

    /// Returns a copy of this snapshot with the given quota timeout.
    pub fn with_timeout<S: Into<String>>(&self, until: DateTime<Utc>, reason: S) -> Self {
        Self {
            timeout: Some(QuotaTimeout {
                until,
                reason: reason.into(),
            }),
            ..self.clone()
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn resource_group(&self) -> &str {
        &self.resource_group
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instance_type(&self) -> &str {
        &self.instance_type
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn provisioning_state(&self) -> &str {
        &self.provisioning_state
    }

    pub fn timeout(&self) -> Option<&QuotaTimeout> {
        self.timeout.as_ref()
    }

    pub fn timeout_until(&self) -> Option<DateTime<Utc>> {
        self.timeout.as_ref().map(|timeout| timeout.until)
    }

    pub fn timeout_reason(&self) -> Option<&str> {
        self.timeout.as_ref().map(|timeout| timeout.reason.as_str())
    }

    /// `resource_group/name`, used to identify the pool in logs and errors.
    pub fn pool_id(&self) -> String {
        format!("{}/{}", self.resource_group, self.name)
    }

    pub fn is_timed_out(&self, now: DateTime<Utc>) -> bool {
        self.timeout
            .as_ref()
            .is_some_and(|timeout| timeout.until > now)
    }
}

//! Contracts of the cloud provider gateway.
//!
//! The gateway is implemented outside of this crate (on top of the provider SDK) and is injected
//! into every [`crate::VirtualScaleSet`]. Requests are independent of each other and each of them
//! carries the full identity of the pool it targets.
mod call;

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use call::CallLimits;

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;
pub type GatewayFuture<T> = Pin<Box<dyn Future<Output = GatewayResult<T>>>>;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// The pool cannot grow because the provider ran out of quota or capacity.
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),
    #[error("Not found: {0}")]
    NotFound(String),
    /// Network, authentication or backend failure.
    #[error("Provider request failed: {0:#}")]
    Provider(anyhow::Error),
}

impl From<anyhow::Error> for GatewayError {
    fn from(error: anyhow::Error) -> Self {
        Self::Provider(error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GatewayOperation {
    ListInstances,
    UpdateCapacity,
    DeleteInstances,
    ListRecentActivity,
}

impl Display for GatewayOperation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            GatewayOperation::ListInstances => "list instances",
            GatewayOperation::UpdateCapacity => "update capacity",
            GatewayOperation::DeleteInstances => "delete instances",
            GatewayOperation::ListRecentActivity => "list recent activity",
        };
        f.write_str(name)
    }
}

/// Stable identifier of a VM, shared with the cluster node that runs on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VmUniqueId(String);

impl VmUniqueId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for VmUniqueId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VmUniqueId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for VmUniqueId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Provider-local ordinal of a VM inside its pool.
///
/// It is only meaningful together with the pool that reported it and only until the next
/// listing, so it is used exclusively for deletion requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceIndex(u32);

impl InstanceIndex {
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn as_num(self) -> u32 {
        self.0
    }
}

impl Display for InstanceIndex {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmInstance {
    pub unique_id: VmUniqueId,
    pub instance_index: InstanceIndex,
    /// Power/provisioning status as reported by the provider.
    pub status: String,
}

/// Idempotent "set target capacity" request for one pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityUpdate {
    pub resource_group: String,
    pub pool_name: String,
    pub region: String,
    pub instance_type: String,
    pub capacity: u64,
}

/// Entry of the provider activity log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub timestamp: DateTime<Utc>,
    pub resource_group: String,
    /// Name of the pool the operation was performed on.
    pub resource_name: String,
    /// Operation status, e.g. `Started`, `Succeeded` or `Failed`.
    pub status: String,
    /// JSON document with the provider error, present on failed operations.
    pub status_message: Option<String>,
}

impl ActivityEvent {
    pub fn is_failed(&self) -> bool {
        self.status.eq_ignore_ascii_case("failed")
    }
}

/// Capability used to talk to the cloud provider.
///
/// Returned futures must not borrow the gateway, everything they need has to be cloned into
/// them. This allows the reconciler to drive several requests at once.
pub trait CloudGateway {
    /// Lists VMs of a single pool.
    fn list_instances(
        &self,
        resource_group: &str,
        pool_name: &str,
    ) -> GatewayFuture<Vec<VmInstance>>;

    /// Sets the target capacity of a pool.
    ///
    /// Fails with [`GatewayError::QuotaExceeded`] when the provider refuses to grow the pool.
    fn update_capacity(&self, update: &CapacityUpdate) -> GatewayFuture<()>;

    /// Deletes the given VMs of a pool.
    fn delete_instances(
        &self,
        resource_group: &str,
        pool_name: &str,
        indices: &[InstanceIndex],
    ) -> GatewayFuture<()>;

    /// Lists activity log entries of a resource group that happened after `since`.
    fn list_recent_activity(
        &self,
        resource_group: &str,
        since: DateTime<Utc>,
    ) -> GatewayFuture<Vec<ActivityEvent>>;
}

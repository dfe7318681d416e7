use std::fmt::{Display, Formatter};
use std::rc::Rc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt};
use tokio_util::sync::CancellationToken;

use crate::Set;
use crate::common::error::ScaleSetError;
use crate::common::timeutils::{add_duration, format_duration};
use crate::config::ReconcilerConfig;
use crate::gateway::{
    CallLimits, CapacityUpdate, CloudGateway, GatewayOperation, InstanceIndex, VmUniqueId,
};
use crate::scaleset::resolution::{PoolListing, plan_deletions};
use crate::scaleset::{Node, ScalePolicy, ScaleSetSnapshot, distribute_capacity};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateStatus {
    Applied,
    /// The provider refused the update, scale-up of the pool is blocked until `until`.
    QuotaExceeded { until: DateTime<Utc> },
}

/// Result of a single capacity update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub pool: String,
    pub capacity: u64,
    pub status: UpdateStatus,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScaleReport {
    /// Issued updates, in pool order.
    pub updates: Vec<UpdateOutcome>,
}

impl ScaleReport {
    pub fn quota_exceeded(&self) -> impl Iterator<Item = &UpdateOutcome> {
        self.updates
            .iter()
            .filter(|update| matches!(update.status, UpdateStatus::QuotaExceeded { .. }))
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScaleInReport {
    /// Instance indices removed from each pool.
    pub deleted: Vec<(String, Vec<InstanceIndex>)>,
    /// Nodes whose VM no longer exists in any pool.
    pub skipped: Vec<VmUniqueId>,
}

/// A set of interchangeable provider pools that is scaled as a single unit.
///
/// All pools share the region, resource group and instance type of the virtual scale set. Their
/// order is significant: it decides which pool receives capacity first.
pub struct VirtualScaleSet {
    region: String,
    resource_group: String,
    instance_type: String,
    gateway: Rc<dyn CloudGateway>,
    policy: ScalePolicy,
    scale_sets: Vec<ScaleSetSnapshot>,
    nodes_in: Vec<Node>,
    limits: CallLimits,
    quota_cooldown: Duration,
}

impl VirtualScaleSet {
    pub fn new(
        region: impl Into<String>,
        resource_group: impl Into<String>,
        gateway: Rc<dyn CloudGateway>,
        instance_type: impl Into<String>,
        slow_scale: bool,
        scale_sets: Vec<ScaleSetSnapshot>,
        nodes_in: Vec<Node>,
    ) -> crate::Result<Self> {
        let config = ReconcilerConfig::default();
        let virtual_set = Self {
            region: region.into(),
            resource_group: resource_group.into(),
            instance_type: instance_type.into(),
            gateway,
            policy: ScalePolicy::from_slow_scale(slow_scale),
            scale_sets,
            nodes_in,
            limits: config.call_limits(),
            quota_cooldown: config.quota_cooldown,
        };
        if let Some(snapshot) = virtual_set
            .scale_sets
            .iter()
            .find(|snapshot| !virtual_set.owns(snapshot))
        {
            return Err(ScaleSetError::MismatchedScaleSet {
                pool: snapshot.pool_id(),
                expected: virtual_set.to_string(),
            });
        }
        Ok(virtual_set)
    }

    /// Applies the scale policy, timeouts, concurrency and cooldown from `config`.
    ///
    /// The cancellation token of the current call limits is kept.
    pub fn with_config(mut self, config: &ReconcilerConfig) -> Self {
        self.policy = ScalePolicy::from_slow_scale(config.slow_scale);
        self.limits = config
            .call_limits()
            .with_cancellation(self.limits.cancellation_token().clone());
        self.quota_cooldown = config.quota_cooldown;
        self
    }

    pub fn with_call_limits(mut self, limits: CallLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_quota_cooldown(mut self, cooldown: Duration) -> Self {
        self.quota_cooldown = cooldown;
        self
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn resource_group(&self) -> &str {
        &self.resource_group
    }

    pub fn instance_type(&self) -> &str {
        &self.instance_type
    }

    pub fn policy(&self) -> ScalePolicy {
        self.policy
    }

    pub fn scale_sets(&self) -> &[ScaleSetSnapshot] {
        &self.scale_sets
    }

    pub fn nodes_in(&self) -> &[Node] {
        &self.nodes_in
    }

    /// Sum of the target capacities of all pools.
    pub fn desired_capacity(&self) -> u64 {
        self.scale_sets.iter().map(|snapshot| snapshot.capacity()).sum()
    }

    /// Returns true if scale-up of any pool is blocked by a quota timeout.
    ///
    /// Quota is usually exhausted for a whole subscription or region, so a single timed out pool
    /// blocks the whole virtual scale set. [`VirtualScaleSet::scale`] does not check this itself.
    pub fn is_timed_out(&self, now: DateTime<Utc>) -> bool {
        self.scale_sets
            .iter()
            .any(|snapshot| snapshot.is_timed_out(now))
    }

    pub async fn scale(&mut self, desired_total: u64) -> crate::Result<ScaleReport> {
        self.scale_at(desired_total, Utc::now()).await
    }

    /// Sets the capacity of the pools so that they sum up to `desired_total`.
    ///
    /// A pool that runs out of quota gets a timeout starting at `now` and does not stop updates
    /// of the other pools. Any other failure is returned after all updates have finished; if
    /// more pools failed, the first one in pool order is reported.
    pub async fn scale_at(
        &mut self,
        desired_total: u64,
        now: DateTime<Utc>,
    ) -> crate::Result<ScaleReport> {
        if self.scale_sets.is_empty() {
            return Err(ScaleSetError::EmptyScaleSets {
                region: self.region.clone(),
                instance_type: self.instance_type.clone(),
            });
        }

        let targets = distribute_capacity(self.policy, desired_total, self.scale_sets.len());
        log::info!(
            "Scaling {self} to {desired_total} instance(s), updating {} of {} pool(s)",
            targets.len(),
            self.scale_sets.len()
        );

        let results: Vec<(usize, u64, crate::Result<()>)> = {
            let limits = &self.limits;
            let requests = targets.into_iter().map(|(index, capacity)| {
                let snapshot = &self.scale_sets[index];
                let update = CapacityUpdate {
                    resource_group: snapshot.resource_group().to_string(),
                    pool_name: snapshot.name().to_string(),
                    region: snapshot.region().to_string(),
                    instance_type: snapshot.instance_type().to_string(),
                    capacity,
                };
                let pool = snapshot.pool_id();
                let previous = snapshot.capacity();
                let request = self.gateway.update_capacity(&update);
                async move {
                    log::debug!("Setting capacity of {pool} from {previous} to {capacity}");
                    let result = limits
                        .call(&pool, GatewayOperation::UpdateCapacity, request)
                        .await;
                    (index, capacity, result)
                }
            });
            futures::stream::iter(requests)
                .buffered(limits.max_concurrent())
                .collect()
                .await
        };

        let mut report = ScaleReport::default();
        let mut failure = None;
        for (index, capacity, result) in results {
            let pool = self.scale_sets[index].pool_id();
            let status = match result {
                Ok(()) => {
                    log::info!("Capacity of {pool} was set to {capacity}");
                    UpdateStatus::Applied
                }
                Err(error) => match error.quota_message().map(|message| message.to_string()) {
                    Some(message) => {
                        let until = add_duration(now, self.quota_cooldown);
                        log::warn!(
                            "Scale set {pool} ran out of quota, its scale-up is blocked for {}: {message}",
                            format_duration(self.quota_cooldown)
                        );
                        self.scale_sets[index] = self.scale_sets[index]
                            .with_timeout(until, format!("Quota exceeded: {message}"));
                        UpdateStatus::QuotaExceeded { until }
                    }
                    None => {
                        log::error!("Failed to scale {pool} to {capacity}: {error}");
                        if failure.is_none() {
                            failure = Some(error);
                        }
                        continue;
                    }
                },
            };
            report.updates.push(UpdateOutcome {
                pool,
                capacity,
                status,
            });
        }

        match failure {
            Some(error) => Err(error),
            None => Ok(report),
        }
    }

    /// Unique ids of all VMs in all pools, queried from the provider.
    pub async fn instance_ids(&self) -> crate::Result<Set<VmUniqueId>> {
        let listings = self.list_pools().await?;
        Ok(listings
            .into_iter()
            .flat_map(|listing| listing.instances.into_iter())
            .map(|instance| instance.unique_id)
            .collect())
    }

    /// Cluster nodes that run on a VM of this virtual scale set, in the order of `nodes_in`.
    pub async fn nodes(&self) -> crate::Result<Vec<Node>> {
        let instance_ids = self.instance_ids().await?;
        Ok(self
            .nodes_in
            .iter()
            .filter(|node| instance_ids.contains(&node.instance_id))
            .cloned()
            .collect())
    }

    pub async fn unschedulable_nodes(&self) -> crate::Result<Vec<Node>> {
        let mut nodes = self.nodes().await?;
        nodes.retain(|node| node.unschedulable);
        Ok(nodes)
    }

    /// Deletes the VMs backing the given nodes.
    ///
    /// Pools are listed once and the listing is used to resolve all nodes. Nodes without a VM
    /// are skipped, every pool with at least one resolved VM receives a single delete request.
    pub async fn scale_nodes_in(&self, nodes: &[Node]) -> crate::Result<ScaleInReport> {
        if nodes.is_empty() {
            return Ok(ScaleInReport::default());
        }

        let listings = self.list_pools().await?;
        let plan = plan_deletions(&listings, nodes);
        for instance_id in &plan.unresolved {
            log::debug!(
                "Instance {instance_id} was not found in {self}, it was probably already removed"
            );
        }

        let results: Vec<(String, crate::Result<()>)> = {
            let limits = &self.limits;
            let requests = plan.groups.iter().map(|group| {
                let snapshot = &self.scale_sets[group.pool_index];
                let pool = snapshot.pool_id();
                let request = self.gateway.delete_instances(
                    snapshot.resource_group(),
                    snapshot.name(),
                    &group.indices,
                );
                log::info!(
                    "Deleting instance(s) {} from {pool}",
                    format_indices(&group.indices)
                );
                async move {
                    let result = limits
                        .call(&pool, GatewayOperation::DeleteInstances, request)
                        .await;
                    (pool, result)
                }
            });
            futures::stream::iter(requests)
                .buffered(limits.max_concurrent())
                .collect()
                .await
        };

        let mut report = ScaleInReport {
            deleted: Vec::with_capacity(results.len()),
            skipped: plan.unresolved.clone(),
        };
        let mut failure = None;
        for ((pool, result), group) in results.into_iter().zip(&plan.groups) {
            match result {
                Ok(()) => {}
                Err(error) if error.is_not_found() => {
                    log::debug!("Instances of {pool} were already removed: {error}");
                }
                Err(error) => {
                    log::error!("Failed to delete instances from {pool}: {error}");
                    if failure.is_none() {
                        failure = Some(error);
                    }
                    continue;
                }
            }
            report.deleted.push((pool, group.indices.clone()));
        }

        match failure {
            Some(error) => Err(error),
            None => Ok(report),
        }
    }

    /// Lists VMs of every pool. The result must not outlive the current operation.
    async fn list_pools(&self) -> crate::Result<Vec<PoolListing>> {
        let limits = &self.limits;
        let requests = self
            .scale_sets
            .iter()
            .enumerate()
            .map(|(pool_index, snapshot)| {
                let pool = snapshot.pool_id();
                let request = self
                    .gateway
                    .list_instances(snapshot.resource_group(), snapshot.name());
                async move {
                    let instances = limits
                        .call(&pool, GatewayOperation::ListInstances, request)
                        .await?;
                    log::debug!("Scale set {pool} has {} instance(s)", instances.len());
                    Ok::<_, ScaleSetError>(PoolListing {
                        pool_index,
                        instances,
                    })
                }
            });
        futures::stream::iter(requests)
            .buffered(limits.max_concurrent())
            .try_collect()
            .await
    }

    fn owns(&self, snapshot: &ScaleSetSnapshot) -> bool {
        snapshot.region() == self.region
            && snapshot.resource_group() == self.resource_group
            && snapshot.instance_type() == self.instance_type
    }

    /// Creates a virtual scale set from pools that are already known to match.
    pub(crate) fn from_group(
        scale_sets: Vec<ScaleSetSnapshot>,
        nodes_in: Vec<Node>,
        gateway: Rc<dyn CloudGateway>,
        config: &ReconcilerConfig,
        cancel: &CancellationToken,
    ) -> Option<Self> {
        let first = scale_sets.first()?;
        Some(Self {
            region: first.region().to_string(),
            resource_group: first.resource_group().to_string(),
            instance_type: first.instance_type().to_string(),
            gateway,
            policy: ScalePolicy::from_slow_scale(config.slow_scale),
            scale_sets,
            nodes_in,
            limits: config.call_limits().with_cancellation(cancel.clone()),
            quota_cooldown: config.quota_cooldown,
        })
    }
}

impl Display for VirtualScaleSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{} ({})",
            self.resource_group, self.instance_type, self.region
        )
    }
}

fn format_indices(indices: &[InstanceIndex]) -> String {
    indices
        .iter()
        .map(|index| index.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

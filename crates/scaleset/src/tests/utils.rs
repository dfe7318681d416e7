use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use derive_builder::Builder;
use log::LevelFilter;

use crate::Map;
use crate::gateway::{
    ActivityEvent, CapacityUpdate, CloudGateway, GatewayError, GatewayFuture, GatewayOperation,
    GatewayResult, InstanceIndex, VmInstance, VmUniqueId,
};
use crate::scaleset::{Node, ScaleSetSnapshot, VirtualScaleSet};

pub const REGION: &str = "test";
pub const RESOURCE_GROUP: &str = "test-resource-group";
pub const INSTANCE_TYPE: &str = "Standard_D1_v2";

pub fn init_logging() {
    let _ = env_logger::Builder::default()
        .filter(None, LevelFilter::Debug)
        .is_test(true)
        .try_init();
}

pub fn vm(unique_id: &str, index: u32) -> VmInstance {
    VmInstance {
        unique_id: VmUniqueId::new(unique_id),
        instance_index: InstanceIndex::new(index),
        status: "Running".to_string(),
    }
}

pub fn node(instance_id: &str) -> Node {
    Node::new(format!("node-{instance_id}"), VmUniqueId::new(instance_id), false)
}

pub fn unschedulable_node(instance_id: &str) -> Node {
    Node::new(format!("node-{instance_id}"), VmUniqueId::new(instance_id), true)
}

// Pool definitions
#[derive(Builder)]
#[builder(pattern = "owned", build_fn(name = "finish"))]
pub struct Pool {
    #[builder(default = "\"test-scale-set\".to_string()", setter(into))]
    name: String,
    #[builder(default = "RESOURCE_GROUP.to_string()", setter(into))]
    resource_group: String,
    #[builder(default = "INSTANCE_TYPE.to_string()", setter(into))]
    instance_type: String,
    #[builder(default = "0")]
    capacity: u64,
    #[builder(default, setter(strip_option))]
    timeout_until: Option<DateTime<Utc>>,
}

impl PoolBuilder {
    pub fn build(self) -> ScaleSetSnapshot {
        let Pool {
            name,
            resource_group,
            instance_type,
            capacity,
            timeout_until,
        } = self.finish().unwrap();
        let snapshot = ScaleSetSnapshot::new(
            REGION,
            resource_group,
            name,
            instance_type,
            capacity,
            "Succeeded".to_string(),
        );
        match timeout_until {
            Some(until) => snapshot.with_timeout(until, "fake reason"),
            None => snapshot,
        }
    }
}

pub fn pool(name: &str) -> ScaleSetSnapshot {
    PoolBuilder::default().name(name).build()
}

pub fn create_virtual_scale_set(
    gateway: &FakeGateway,
    slow_scale: bool,
    scale_sets: Vec<ScaleSetSnapshot>,
    nodes: Vec<Node>,
) -> VirtualScaleSet {
    VirtualScaleSet::new(
        REGION,
        RESOURCE_GROUP,
        gateway.shared(),
        INSTANCE_TYPE,
        slow_scale,
        scale_sets,
        nodes,
    )
    .unwrap()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Quota,
    NotFound,
    Provider,
    /// The request never finishes.
    Hang,
}

impl Failure {
    async fn into_result<T>(self, target: &str) -> GatewayResult<T> {
        match self {
            Failure::Quota => Err(GatewayError::QuotaExceeded(format!(
                "Operation results in exceeding quota limits of {target}"
            ))),
            Failure::NotFound => Err(GatewayError::NotFound(target.to_string())),
            Failure::Provider => Err(anyhow::anyhow!("Backend of {target} is unavailable").into()),
            Failure::Hang => futures::future::pending().await,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    ListInstances {
        resource_group: String,
        pool: String,
    },
    UpdateCapacity(CapacityUpdate),
    DeleteInstances {
        resource_group: String,
        pool: String,
        indices: Vec<InstanceIndex>,
    },
    ListRecentActivity {
        resource_group: String,
    },
}

#[derive(Default)]
struct FakeGatewayState {
    /// Instances of pools, keyed by pool name.
    instances: Map<String, Vec<VmInstance>>,
    /// Activity events, keyed by resource group.
    activity: Map<String, Vec<ActivityEvent>>,
    /// Failures keyed by pool name (or resource group for activity) and operation.
    failures: Map<(String, GatewayOperation), Failure>,
    calls: Vec<GatewayCall>,
    /// Delay before every response.
    latency: Option<Duration>,
    in_flight: usize,
    max_in_flight: usize,
}

impl FakeGatewayState {
    fn failure(&self, target: &str, operation: GatewayOperation) -> Option<Failure> {
        self.failures
            .get(&(target.to_string(), operation))
            .copied()
    }
}

/// Gateway that keeps pools in memory and records every request it receives.
#[derive(Clone, Default)]
pub struct FakeGateway {
    state: Rc<RefCell<FakeGatewayState>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_instances(self, pool: &str, instances: Vec<VmInstance>) -> Self {
        self.state
            .borrow_mut()
            .instances
            .insert(pool.to_string(), instances);
        self
    }

    pub fn with_activity(self, resource_group: &str, events: Vec<ActivityEvent>) -> Self {
        self.state
            .borrow_mut()
            .activity
            .insert(resource_group.to_string(), events);
        self
    }

    pub fn fail(self, target: &str, operation: GatewayOperation, failure: Failure) -> Self {
        self.state
            .borrow_mut()
            .failures
            .insert((target.to_string(), operation), failure);
        self
    }

    pub fn with_latency(self, latency: Duration) -> Self {
        self.state.borrow_mut().latency = Some(latency);
        self
    }

    pub fn shared(&self) -> Rc<dyn CloudGateway> {
        Rc::new(self.clone())
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.state.borrow().calls.clone()
    }

    pub fn capacity_updates(&self) -> Vec<CapacityUpdate> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                GatewayCall::UpdateCapacity(update) => Some(update),
                _ => None,
            })
            .collect()
    }

    pub fn deletions(&self) -> Vec<(String, Vec<InstanceIndex>)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                GatewayCall::DeleteInstances { pool, indices, .. } => Some((pool, indices)),
                _ => None,
            })
            .collect()
    }

    pub fn listing_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, GatewayCall::ListInstances { .. }))
            .count()
    }

    /// Highest number of requests that were being answered at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.state.borrow().max_in_flight
    }

    /// Records the call and returns the programmed failure for it, if there is any.
    fn record(
        &self,
        call: GatewayCall,
        target: &str,
        operation: GatewayOperation,
    ) -> Option<Failure> {
        let mut state = self.state.borrow_mut();
        state.calls.push(call);
        state.failure(target, operation)
    }

    fn respond<T: 'static>(
        &self,
        failure: Option<Failure>,
        target: &str,
        value: T,
    ) -> GatewayFuture<T> {
        let state = self.state.clone();
        let latency = state.borrow().latency;
        let target = target.to_string();
        Box::pin(async move {
            {
                let mut state = state.borrow_mut();
                state.in_flight += 1;
                state.max_in_flight = state.max_in_flight.max(state.in_flight);
            }
            if let Some(latency) = latency {
                tokio::time::sleep(latency).await;
            }
            state.borrow_mut().in_flight -= 1;
            match failure {
                Some(failure) => failure.into_result(&target).await,
                None => Ok(value),
            }
        })
    }
}

impl CloudGateway for FakeGateway {
    fn list_instances(
        &self,
        resource_group: &str,
        pool_name: &str,
    ) -> GatewayFuture<Vec<VmInstance>> {
        let failure = self.record(
            GatewayCall::ListInstances {
                resource_group: resource_group.to_string(),
                pool: pool_name.to_string(),
            },
            pool_name,
            GatewayOperation::ListInstances,
        );
        let instances = self
            .state
            .borrow()
            .instances
            .get(pool_name)
            .cloned()
            .unwrap_or_default();
        self.respond(failure, pool_name, instances)
    }

    fn update_capacity(&self, update: &CapacityUpdate) -> GatewayFuture<()> {
        let failure = self.record(
            GatewayCall::UpdateCapacity(update.clone()),
            &update.pool_name,
            GatewayOperation::UpdateCapacity,
        );
        self.respond(failure, &update.pool_name, ())
    }

    fn delete_instances(
        &self,
        resource_group: &str,
        pool_name: &str,
        indices: &[InstanceIndex],
    ) -> GatewayFuture<()> {
        let failure = self.record(
            GatewayCall::DeleteInstances {
                resource_group: resource_group.to_string(),
                pool: pool_name.to_string(),
                indices: indices.to_vec(),
            },
            pool_name,
            GatewayOperation::DeleteInstances,
        );
        if failure.is_none() {
            if let Some(instances) = self.state.borrow_mut().instances.get_mut(pool_name) {
                instances.retain(|instance| !indices.contains(&instance.instance_index));
            }
        }
        self.respond(failure, pool_name, ())
    }

    fn list_recent_activity(
        &self,
        resource_group: &str,
        since: DateTime<Utc>,
    ) -> GatewayFuture<Vec<ActivityEvent>> {
        let failure = self.record(
            GatewayCall::ListRecentActivity {
                resource_group: resource_group.to_string(),
            },
            resource_group,
            GatewayOperation::ListRecentActivity,
        );
        let events: Vec<ActivityEvent> = self
            .state
            .borrow()
            .activity
            .get(resource_group)
            .map(|events| {
                events
                    .iter()
                    .filter(|event| event.timestamp > since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        self.respond(failure, resource_group, events)
    }
}

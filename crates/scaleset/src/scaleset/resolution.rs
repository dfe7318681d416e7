//! Mapping of cluster nodes onto provider instances.
//!
//! Nodes know the stable unique id of their VM, while deletion requests need the transient
//! instance index of the VM within its pool. The lookup between the two always goes through a
//! fresh listing of the pools.
use crate::gateway::{InstanceIndex, VmInstance, VmUniqueId};
use crate::scaleset::Node;

/// VMs of a single pool, as listed at the start of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolListing {
    /// Position of the pool in the virtual scale set.
    pub pool_index: usize,
    pub instances: Vec<VmInstance>,
}

/// Instance indices that should be deleted from a single pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionGroup {
    pub pool_index: usize,
    pub indices: Vec<InstanceIndex>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeletionPlan {
    /// Groups ordered by pool position, only pools with something to delete are present.
    pub groups: Vec<DeletionGroup>,
    /// Nodes whose VM was not found in any pool.
    pub unresolved: Vec<VmUniqueId>,
}

/// Finds the VM with the given unique id, returning the position of its pool in the virtual scale
/// set and the VM itself.
pub fn resolve_instance<'a>(
    listings: &'a [PoolListing],
    unique_id: &VmUniqueId,
) -> Option<(usize, &'a VmInstance)> {
    listings.iter().find_map(|listing| {
        listing
            .instances
            .iter()
            .find(|instance| &instance.unique_id == unique_id)
            .map(|instance| (listing.pool_index, instance))
    })
}

/// Groups the instance indices of the given nodes by the pool that owns them.
pub fn plan_deletions(listings: &[PoolListing], nodes: &[Node]) -> DeletionPlan {
    let mut plan = DeletionPlan::default();
    for node in nodes {
        match resolve_instance(listings, &node.instance_id) {
            Some((pool_index, instance)) => {
                let position = match plan
                    .groups
                    .iter()
                    .position(|group| group.pool_index == pool_index)
                {
                    Some(position) => position,
                    None => {
                        plan.groups.push(DeletionGroup {
                            pool_index,
                            indices: vec![],
                        });
                        plan.groups.len() - 1
                    }
                };
                let group = &mut plan.groups[position];
                if !group.indices.contains(&instance.instance_index) {
                    group.indices.push(instance.instance_index);
                }
            }
            None => plan.unresolved.push(node.instance_id.clone()),
        }
    }
    plan.groups.sort_by_key(|group| group.pool_index);
    plan
}

use std::rc::Rc;

use tokio_util::sync::CancellationToken;

use crate::Map;
use crate::config::ReconcilerConfig;
use crate::gateway::CloudGateway;
use crate::scaleset::{Node, ScaleSetSnapshot, VirtualScaleSet};

type GroupKey = (String, String, String);

fn group_key(snapshot: &ScaleSetSnapshot) -> GroupKey {
    (
        snapshot.region().to_string(),
        snapshot.resource_group().to_string(),
        snapshot.instance_type().to_string(),
    )
}

/// Groups provider pools into virtual scale sets.
///
/// Pools with the same region, resource group and instance type form one virtual scale set.
/// Virtual scale sets are returned in the order in which their first pool appears in
/// `snapshots`, pools inside each of them are ordered by name. Every virtual scale set receives
/// all `nodes`, it filters them itself when it lists its VMs. Cancelling `cancel` abandons
/// gateway requests of all of them.
pub fn group_scale_sets(
    snapshots: Vec<ScaleSetSnapshot>,
    nodes: &[Node],
    gateway: Rc<dyn CloudGateway>,
    config: &ReconcilerConfig,
    cancel: &CancellationToken,
) -> Vec<VirtualScaleSet> {
    let mut positions: Map<GroupKey, usize> = Map::default();
    let mut groups: Vec<Vec<ScaleSetSnapshot>> = Vec::new();
    for snapshot in snapshots {
        let key = group_key(&snapshot);
        match positions.get(&key) {
            Some(&position) => groups[position].push(snapshot),
            None => {
                positions.insert(key, groups.len());
                groups.push(vec![snapshot]);
            }
        }
    }

    groups
        .into_iter()
        .filter_map(|mut scale_sets| {
            scale_sets.sort_by(|a, b| a.name().cmp(b.name()));
            let virtual_set = VirtualScaleSet::from_group(
                scale_sets,
                nodes.to_vec(),
                gateway.clone(),
                config,
                cancel,
            )?;
            log::debug!(
                "Virtual scale set {virtual_set} consists of {} pool(s)",
                virtual_set.scale_sets().len()
            );
            Some(virtual_set)
        })
        .collect()
}

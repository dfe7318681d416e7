use serde::{Deserialize, Serialize};

use crate::gateway::VmUniqueId;

/// Cluster view of a machine. It is only read by the reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub instance_id: VmUniqueId,
    pub unschedulable: bool,
}

impl Node {
    pub fn new<S: Into<String>>(name: S, instance_id: VmUniqueId, unschedulable: bool) -> Self {
        Self {
            name: name.into(),
            instance_id,
            unschedulable,
        }
    }
}

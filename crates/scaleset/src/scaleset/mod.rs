//! Virtual scale sets: one logical pool made of several provider pools.
mod distribution;
mod grouping;
mod node;
mod resolution;
mod snapshot;
mod virtual_set;

pub use distribution::{ScalePolicy, distribute_capacity};
pub use grouping::group_scale_sets;
pub use node::Node;
pub use resolution::{DeletionGroup, DeletionPlan, PoolListing, plan_deletions, resolve_instance};
pub use snapshot::{QuotaTimeout, ScaleSetSnapshot};
pub use virtual_set::{ScaleInReport, ScaleReport, UpdateOutcome, UpdateStatus, VirtualScaleSet};

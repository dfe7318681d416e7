use serde::{Deserialize, Serialize};

/// How is the desired capacity of a virtual scale set split among its pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScalePolicy {
    /// Everything goes into the first pool, other pools are not touched.
    Concentrated,
    /// Capacity is spread evenly over all pools, earlier pools get the remainder.
    Distributed,
}

impl ScalePolicy {
    pub fn from_slow_scale(slow_scale: bool) -> Self {
        if slow_scale {
            ScalePolicy::Distributed
        } else {
            ScalePolicy::Concentrated
        }
    }
}

/// Computes the new capacity of pools as `(pool index, capacity)` pairs in pool order.
///
/// Only the pools that should receive an update are returned. Returns an empty vector when there
/// are no pools.
pub fn distribute_capacity(
    policy: ScalePolicy,
    desired_total: u64,
    pool_count: usize,
) -> Vec<(usize, u64)> {
    if pool_count == 0 {
        return vec![];
    }
    match policy {
        ScalePolicy::Concentrated => vec![(0, desired_total)],
        ScalePolicy::Distributed => {
            let count = pool_count as u64;
            let base = desired_total / count;
            let remainder = desired_total % count;
            (0..pool_count)
                .map(|index| {
                    let extra = u64::from((index as u64) < remainder);
                    (index, base + extra)
                })
                .collect()
        }
    }
}

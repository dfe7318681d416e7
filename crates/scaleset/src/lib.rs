//! Capacity reconciliation of cloud VM scale sets.
//!
//! A [`VirtualScaleSet`] groups one or more provider scale sets (pools) of the same instance type
//! and treats them as a single scalable unit. It distributes a desired capacity across the pools,
//! reports whether scale-up is blocked by a quota timeout and removes individual machines during
//! scale-in by resolving cluster nodes to provider instances.
//!
//! The provider is reached only through the injected [`CloudGateway`]. The caller decides when to
//! reconcile and how to retry failures.
#![deny(clippy::await_holding_refcell_ref)]

pub mod common;
pub mod config;
pub mod gateway;
pub mod quota;
pub mod scaleset;

#[cfg(test)]
pub(crate) mod tests;

pub type Error = crate::common::error::ScaleSetError;
pub type Result<T> = std::result::Result<T, Error>;

// Reexports
pub use crate::common::{Map, Set};
pub use crate::config::ReconcilerConfig;
pub use crate::gateway::{
    ActivityEvent, CallLimits, CapacityUpdate, CloudGateway, GatewayError, GatewayFuture,
    GatewayOperation, GatewayResult, InstanceIndex, VmInstance, VmUniqueId,
};
pub use crate::scaleset::{
    Node, QuotaTimeout, ScaleInReport, ScalePolicy, ScaleReport, ScaleSetSnapshot, UpdateOutcome,
    UpdateStatus, VirtualScaleSet, group_scale_sets,
};

use std::time::Duration;

use thiserror::Error;

use crate::gateway::{GatewayError, GatewayOperation};

#[derive(Debug, Error)]
pub enum ScaleSetError {
    #[error("Virtual scale set {instance_type} in {region} contains no scale sets")]
    EmptyScaleSets {
        region: String,
        instance_type: String,
    },
    #[error("Scale set {pool} does not belong to virtual scale set {expected}")]
    MismatchedScaleSet { pool: String, expected: String },
    #[error("Failed to {operation} for scale set {pool}: {source}")]
    Gateway {
        pool: String,
        operation: GatewayOperation,
        source: GatewayError,
    },
    #[error("Request to {operation} for scale set {pool} did not finish in {timeout:?}")]
    CallTimedOut {
        pool: String,
        operation: GatewayOperation,
        timeout: Duration,
    },
    #[error("Request to {operation} for scale set {pool} was cancelled")]
    Cancelled {
        pool: String,
        operation: GatewayOperation,
    },
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ScaleSetError {
    /// Returns the provider message if the error is a quota exhaustion of a single pool.
    pub fn quota_message(&self) -> Option<&str> {
        match self {
            ScaleSetError::Gateway {
                source: GatewayError::QuotaExceeded(message),
                ..
            } => Some(message),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ScaleSetError::Gateway {
                source: GatewayError::NotFound(_),
                ..
            }
        )
    }

    /// Pool that the failed request was targeting, if any.
    pub fn pool(&self) -> Option<&str> {
        match self {
            ScaleSetError::Gateway { pool, .. }
            | ScaleSetError::CallTimedOut { pool, .. }
            | ScaleSetError::Cancelled { pool, .. }
            | ScaleSetError::MismatchedScaleSet { pool, .. } => Some(pool),
            ScaleSetError::EmptyScaleSets { .. } | ScaleSetError::InvalidConfig(_) => None,
        }
    }
}

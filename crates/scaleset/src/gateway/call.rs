use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::common::error::ScaleSetError;
use crate::gateway::{GatewayFuture, GatewayOperation};

/// Bounds applied to every gateway request issued by the reconciler.
#[derive(Debug, Clone)]
pub struct CallLimits {
    timeout: Duration,
    max_concurrent: usize,
    cancel: CancellationToken,
}

impl CallLimits {
    pub fn new(timeout: Duration, max_concurrent: usize) -> Self {
        Self {
            timeout,
            max_concurrent: max_concurrent.max(1),
            cancel: CancellationToken::new(),
        }
    }

    /// Requests in flight are abandoned once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// How many independent per-pool requests may be in flight at once.
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Awaits a gateway request, attaching the pool and operation to any failure.
    pub(crate) async fn call<T>(
        &self,
        pool: &str,
        operation: GatewayOperation,
        request: GatewayFuture<T>,
    ) -> crate::Result<T> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                log::debug!("Request to {operation} for {pool} was cancelled");
                Err(ScaleSetError::Cancelled {
                    pool: pool.to_string(),
                    operation,
                })
            }
            result = tokio::time::timeout(self.timeout, request) => match result {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(source)) => Err(ScaleSetError::Gateway {
                    pool: pool.to_string(),
                    operation,
                    source,
                }),
                Err(_) => Err(ScaleSetError::CallTimedOut {
                    pool: pool.to_string(),
                    operation,
                    timeout: self.timeout,
                }),
            }
        }
    }
}

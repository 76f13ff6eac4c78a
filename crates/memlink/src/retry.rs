//! Retry executor with exponential backoff
//!
//! Wraps a single remote call, retrying connection-class failures and
//! rebuilding the transport between attempts. Remote rejections and other
//! failures are surfaced immediately.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

use crate::config::Config;
use crate::connection::ConnectionManager;
use crate::error::{MemlinkError, Result};
use crate::transport::TransportHandle;

/// Retry settings resolved from configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub backoff_factor: f64,
    pub auto_rebuild: bool,
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_retries: config.retry.max_retries.max(1),
            initial_delay: Duration::try_from_secs_f64(config.retry.initial_delay_secs)
                .unwrap_or(Duration::ZERO),
            backoff_factor: config.retry.backoff_factor,
            auto_rebuild: config.connection.auto_rebuild,
        }
    }

    /// Delay after the failed attempt with zero-based index `attempt`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }
}

/// Runs remote calls with bounded retries against the managed transport
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    manager: Arc<ConnectionManager>,
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(manager: Arc<ConnectionManager>, policy: RetryPolicy) -> Self {
        Self { manager, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute `operation`, which performs exactly one attempt on the handle
    /// it is given.
    pub async fn execute<T, F, Fut>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut(Arc<TransportHandle>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        // A failed health check is one more transient failure; the attempt
        // loop finds no live handle and rebuilds with backoff
        if let Err(e) = self.manager.ensure_healthy().await {
            if !e.is_connection() {
                return Err(e);
            }
            warn!("Health check failed, continuing with retries: {}", e);
        }

        let max_retries = self.policy.max_retries;
        for attempt in 0..max_retries {
            let (generation, outcome) = match self.manager.current().await {
                Ok(handle) => (Some(handle.generation()), operation(handle).await),
                Err(e) => (None, Err(e)),
            };

            let err = match outcome {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !err.is_connection() {
                return Err(match err {
                    MemlinkError::Remote { .. }
                    | MemlinkError::Unclassified(_)
                    | MemlinkError::Closed => err,
                    other => MemlinkError::Unclassified(other.to_string()),
                });
            }

            if attempt + 1 == max_retries {
                error!("All {} attempts failed: {}", max_retries, err);
                return Err(MemlinkError::RetriesExhausted {
                    attempts: max_retries,
                    source: Box::new(err),
                });
            }

            if self.policy.auto_rebuild {
                let rebuilt = match generation {
                    Some(generation) => self.manager.rebuild_if_current(generation).await,
                    None => self.manager.rebuild().await,
                };
                if let Err(e) = rebuilt {
                    warn!("Transport rebuild failed, continuing retries: {}", e);
                }
            }

            let wait = self.policy.delay_for(attempt);
            warn!(
                "Request failed, retrying in {:?} (attempt {}/{}): {}",
                wait,
                attempt + 1,
                max_retries,
                err
            );
            tokio::time::sleep(wait).await;
        }

        // max_retries is at least 1, so the loop always returns
        Err(MemlinkError::Unclassified(
            "Retry loop ended without an attempt".to_string(),
        ))
    }
}

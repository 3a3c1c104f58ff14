//! Retry policy for transient provider failures.
//!
//! Connection and timeout errors get exactly one retry after a constant
//! backoff; anything still failing is reclassified by the calling stage.
//! Non-transient errors are never retried.

use std::future::Future;
use std::time::Duration;

use backon::{ConstantBuilder, Retryable};

use crate::providers::ProviderError;

/// Single-retry constant-backoff policy.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Delay before the retry attempt
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Create a policy with the given backoff.
    pub fn new(backoff: Duration) -> Self {
        Self { backoff }
    }

    /// Run `op`, retrying once on a transient [`ProviderError`].
    pub async fn run<T, F, Fut>(&self, op: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        op.retry(
            ConstantBuilder::default()
                .with_delay(self.backoff)
                .with_max_times(1),
        )
        .when(ProviderError::is_transient)
        .notify(|err: &ProviderError, dur: Duration| {
            tracing::warn!(error = %err, backoff = ?dur, "transient provider failure, retrying");
        })
        .await
    }
}

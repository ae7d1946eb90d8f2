//! Retry and deadline handling around a [`CompletionClient`].
//!
//! Transient failures (backend errors and rate limiting) are retried with
//! exponential backoff. Every attempt runs under the request deadline; an
//! expired deadline cancels the attempt and is reported, never retried.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{info, warn};

use super::traits::CompletionClient;
use super::types::{CompletionOptions, ProjectContext, StreamCallback};
use crate::constants::{DEFAULT_INITIAL_BACKOFF_MS, DEFAULT_MAX_RETRIES, MAX_BACKOFF_MS};
use crate::session::Turn;
use crate::utils::{AzccError, Result};

/// Bounded exponential backoff
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each subsequent one
    pub initial_backoff: Duration,
    /// Upper bound for any single delay
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff: Duration::from_millis(DEFAULT_INITIAL_BACKOFF_MS),
            max_backoff: Duration::from_millis(MAX_BACKOFF_MS),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based)
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Delay for a failed attempt, honoring a longer server hint
    fn delay_for(&self, retry: u32, error: &AzccError) -> Duration {
        let computed = self.backoff_delay(retry);
        match error {
            AzccError::RateLimit {
                retry_after: Some(hint),
                ..
            } => computed.max(*hint).min(self.max_backoff),
            _ => computed,
        }
    }
}

/// Wraps a client with the retry policy and a per-attempt deadline
pub struct RetryingClient<C> {
    inner: C,
    policy: RetryPolicy,
    timeout: Duration,
}

impl<C: CompletionClient> RetryingClient<C> {
    pub fn new(inner: C, policy: RetryPolicy, timeout: Duration) -> Self {
        Self {
            inner,
            policy,
            timeout,
        }
    }
}

#[async_trait]
impl<C: CompletionClient> CompletionClient for RetryingClient<C> {
    async fn complete(
        &self,
        turns: &[Turn],
        context: Option<&ProjectContext>,
        options: &CompletionOptions,
        stream: Option<StreamCallback>,
    ) -> Result<String> {
        let mut retry = 0;
        loop {
            let attempt = self
                .inner
                .complete(turns, context, options, stream.clone());

            let error = match tokio::time::timeout(self.timeout, attempt).await {
                Ok(Ok(text)) => {
                    if retry > 0 {
                        info!(
                            backend = self.inner.name(),
                            retries = retry,
                            "Backend recovered after retries"
                        );
                    }
                    return Ok(text);
                }
                Ok(Err(e)) => e,
                Err(_) => return Err(AzccError::Timeout(self.timeout)),
            };

            if !error.is_retryable() || retry >= self.policy.max_retries {
                return Err(error);
            }

            let delay = self.policy.delay_for(retry, &error);
            warn!(
                backend = self.inner.name(),
                attempt = retry + 1,
                max_retries = self.policy.max_retries,
                delay_ms = delay.as_millis() as u64,
                "Completion failed, retrying: {}",
                error
            );
            tokio::time::sleep(delay).await;
            retry += 1;
        }
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

use crate::error::GatewayError;

const JITTER_FACTOR: f64 = 0.1;

/// Bounded exponential backoff: `base * 2^n`, capped at `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
        }
    }

    /// Delay before retry number `retry` (0-based), without jitter.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32 << retry.min(16);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    fn jittered(&self, retry: u32) -> Duration {
        let delay = self.backoff(retry);
        delay.mul_f64(1.0 + fastrand::f64() * JITTER_FACTOR).min(self.max_delay)
    }
}

/// Runs `call` until it succeeds, fails with a non-retryable error, or the
/// retry budget is spent.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut call: F,
) -> Result<T, GatewayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    let mut retry = 0u32;
    loop {
        match call().await {
            Ok(value) => {
                if retry > 0 {
                    tracing::info!(
                        operation,
                        attempts = retry + 1,
                        "provider call succeeded after retries"
                    );
                }
                return Ok(value);
            }
            Err(err) if err.is_retryable() && retry < policy.max_retries => {
                let delay = policy.jittered(retry);
                tracing::warn!(
                    operation,
                    attempt = retry + 1,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "transient provider failure, retrying: {err}"
                );
                sleep(delay).await;
                retry += 1;
            }
            Err(err) => {
                tracing::warn!(operation, attempts = retry + 1, "provider call failed: {err}");
                return Err(err);
            }
        }
    }
}

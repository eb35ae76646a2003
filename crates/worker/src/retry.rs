//! Capped exponential backoff for Job Store writes.
//!
//! Terminal-state writes must not be lost to a storage outage, so
//! transient failures ([`StoreError::is_unavailable`]) are retried until the
//! write goes through. Once `alarm_after` attempts have failed, every further
//! failure is logged at `error` level.

use std::future::Future;
use std::time::Duration;

use archdiffer_db::store::StoreError;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub alarm_after: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            alarm_after: 5,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }
}

/// Run `op` until it succeeds or fails with a non-transient error.
pub async fn with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut op: F,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::info!(operation, retries = attempt, "Store write succeeded after retries");
                }
                return Ok(value);
            }
            Err(e) if e.is_unavailable() => {
                attempt += 1;
                let delay = policy.delay_for(attempt);
                if attempt >= policy.alarm_after {
                    tracing::error!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Store still unavailable, retrying",
                    );
                } else {
                    tracing::warn!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Store unavailable, retrying",
                    );
                }
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

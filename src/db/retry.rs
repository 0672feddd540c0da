use std::{future::Future, time::Duration};

use tracing::warn;

use super::DbError;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `retry` (1-based): `base * 2^(retry-1)`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1 << exp)
    }
}

/// Value produced by a retried operation plus how many attempts it took.
#[derive(Debug)]
pub struct Attempted<T> {
    pub value: T,
    pub attempts: u32,
}

/// Runs `op` until it succeeds, fails permanently, or the retry budget is spent.
/// `op` receives the 1-based attempt number.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<Attempted<T>, DbError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, DbError>>,
{
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => {
                return Ok(Attempted {
                    value,
                    attempts: attempt,
                })
            }
            Err(DbError::Transient(source)) => {
                if attempt > policy.max_retries {
                    return Err(DbError::ExhaustedRetries {
                        attempts: attempt,
                        source,
                    });
                }
                let delay = policy.delay_for(attempt);
                warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %source,
                    "transient database error; retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(other) => return Err(other),
        }
    }
}

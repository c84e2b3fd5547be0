//! Bounded exponential-backoff retry with jitter.
//!
//! Wraps any single external call. Only classified-retryable failures are
//! retried; after the retry budget is exhausted, or on the first fatal
//! error, the original error propagates unchanged.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

/// Retry budget and delay curve.
#[derive(Debug, Clone, Copy)]
pub struct RetryOptions {
    /// Retries after the first attempt (3 means up to 4 attempts total).
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub backoff_factor: f64,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(250),
            backoff_factor: 2.0,
        }
    }
}

/// Un-jittered delay before retrying after failed attempt `attempt`
/// (1-indexed): `initial_delay * backoff_factor^(attempt-1)`.
pub fn backoff_delay(options: &RetryOptions, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1) as i32;
    options.initial_delay.mul_f64(options.backoff_factor.powi(exponent))
}

/// Add up to 10% random jitter on top of the base delay.
fn jittered(base: Duration) -> Duration {
    let jitter = rand::thread_rng().gen_range(0.0..0.1);
    base.mul_f64(1.0 + jitter)
}

/// Run `op` with bounded retries.
///
/// `op` receives the 1-indexed attempt number. `is_retryable` classifies
/// failures; everything it rejects propagates immediately.
pub async fn with_retry<T, E, F, Fut>(mut op: F, options: &RetryOptions, is_retryable: impl Fn(&E) -> bool) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt: u32 = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) if attempt <= options.max_retries && is_retryable(&error) => {
                let delay = jittered(backoff_delay(options, attempt));
                warn!(
                    attempt,
                    max_retries = options.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "retryable failure, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}

//! Exponential backoff retry for sink delivery.

use crate::config::RetryConfig;
use crate::error::SinkError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Execute an async operation with exponential backoff retry on transient errors.
///
/// Retries on errors for which [`SinkError::is_retryable`] holds. Permanent
/// errors (auth, credentials, rejected payloads) return immediately. On success
/// the number of attempts taken is returned alongside the value.
pub async fn with_retry<F, Fut, T>(config: &RetryConfig, operation: F) -> Result<(T, u32), SinkError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, SinkError>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(val) => return Ok((val, attempt + 1)),
            Err(e) => {
                if !e.is_retryable() || attempt >= config.max_retries {
                    return Err(e);
                }

                let backoff_ms = compute_backoff(config, attempt);
                tracing::warn!(
                    attempt = attempt + 1,
                    max = config.max_retries,
                    backoff_ms = backoff_ms,
                    error = %e,
                    "Retrying sink delivery after transient error"
                );
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                attempt += 1;
            }
        }
    }
}

/// Backoff with optional jitter.
fn compute_backoff(config: &RetryConfig, attempt: u32) -> u64 {
    let capped = compute_exponential_backoff(config, attempt);
    if config.jitter && capped > 0 {
        // Up to 25% on top of the capped delay.
        let jitter = rand::thread_rng().gen_range(0..=capped / 4);
        capped + jitter
    } else {
        capped
    }
}

/// Pure exponential backoff, capped at `max_backoff_ms`.
fn compute_exponential_backoff(config: &RetryConfig, attempt: u32) -> u64 {
    let base = config.initial_backoff_ms as f64 * config.backoff_multiplier.powi(attempt as i32);
    base.min(config.max_backoff_ms as f64) as u64
}

//! Utility functions and helpers for the dataplane

use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::{DataplaneError, Result};

/// Seconds in a 365-day year
pub const SECONDS_PER_YEAR: f64 = 31_536_000.0;

/// Retry a future with exponential backoff. Non-retryable errors are
/// returned immediately.
pub async fn retry_with_backoff<F, Fut, T>(
    operation: F,
    config: &RetryConfig,
    operation_name: &str,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut delay = config.initial_delay();
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        debug!(
            operation = operation_name,
            attempt = attempt,
            max_attempts = max_attempts,
            "Attempting operation"
        );

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(
                        operation = operation_name,
                        attempt = attempt,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(error) if attempt < max_attempts && error.is_retryable() => {
                warn!(
                    operation = operation_name,
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Operation failed, retrying"
                );

                sleep(delay).await;
                delay = std::cmp::min(
                    Duration::from_millis(
                        (delay.as_millis() as f64 * config.backoff_multiplier) as u64,
                    ),
                    config.max_delay(),
                );
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}

/// Execute a future with a timeout
pub async fn with_timeout<F, T>(
    future: F,
    timeout_duration: Duration,
    operation_name: &str,
) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    match timeout(timeout_duration, future).await {
        Ok(result) => result,
        Err(_) => {
            warn!(
                operation = operation_name,
                timeout_ms = timeout_duration.as_millis() as u64,
                "Operation timed out"
            );
            Err(DataplaneError::Timeout {
                operation: operation_name.to_string(),
                timeout_ms: timeout_duration.as_millis() as u64,
            })
        }
    }
}

/// Annualize a simple APR (percent) compounded `periods` times a year into an
/// APY (percent)
pub fn apr_to_apy(apr_pct: f64, periods_per_year: f64) -> f64 {
    if periods_per_year <= 0.0 {
        return apr_pct;
    }
    ((1.0 + apr_pct / 100.0 / periods_per_year).powf(periods_per_year) - 1.0) * 100.0
}

/// Annualize a per-second rate (fraction) compounded every second into an
/// APY (percent)
pub fn per_second_rate_to_apy(rate_per_second: f64) -> f64 {
    // ln_1p/exp_m1 keep precision for the tiny per-second rates lenders quote
    (SECONDS_PER_YEAR * rate_per_second.ln_1p()).exp_m1() * 100.0
}

/// Weighted mean of `(value, weight)` pairs; zero when total weight is zero
pub fn weighted_mean(samples: &[(f64, f64)]) -> f64 {
    let total_weight: f64 = samples.iter().map(|(_, w)| *w).sum();
    if total_weight <= 0.0 {
        return 0.0;
    }
    samples.iter().map(|(v, w)| v * w).sum::<f64>() / total_weight
}

/// Weighted population standard deviation of `(value, weight)` pairs
pub fn weighted_std_dev(samples: &[(f64, f64)]) -> f64 {
    let total_weight: f64 = samples.iter().map(|(_, w)| *w).sum();
    if total_weight <= 0.0 {
        return 0.0;
    }
    let mean = weighted_mean(samples);
    let variance = samples
        .iter()
        .map(|(v, w)| w * (v - mean).powi(2))
        .sum::<f64>()
        / total_weight;
    variance.sqrt()
}

//! Async utilities and patterns
//!
//! Retry with backoff, timeouts, and a shared concurrency limiter for outbound calls

use crate::error::{DossierError, DossierResult, ErrorContext};
use std::future::Future;
use std::sync::Arc;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, error, warn};

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (1 means no retry)
    pub max_attempts: usize,
    /// Initial delay between retries in milliseconds
    pub initial_delay_ms: u64,
    /// Maximum delay between retries in milliseconds
    pub max_delay_ms: u64,
    /// Backoff multiplier (exponential backoff)
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 30000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }
}

/// Retry an async operation with exponential backoff.
///
/// Only errors reporting `is_recoverable()` are retried; anything else is returned at once.
pub async fn retry_async<F, Fut, T>(
    mut operation: F,
    config: &RetryConfig,
    operation_name: &str,
) -> DossierResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = DossierResult<T>>,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay_ms;

    loop {
        attempt += 1;

        debug!(
            operation = operation_name,
            attempt = attempt,
            max_attempts = config.max_attempts,
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
            Err(err) => {
                if attempt >= config.max_attempts || !err.is_recoverable() {
                    if config.max_attempts > 1 {
                        error!(
                            operation = operation_name,
                            attempt = attempt,
                            error = %err,
                            "Operation failed after all retry attempts"
                        );
                    }
                    return Err(err);
                }

                let base_delay = err.retry_delay_ms().unwrap_or(0).max(delay);
                let actual_delay = if config.jitter {
                    let jitter_factor = 0.1;
                    let jitter = (fastrand::f64() - 0.5) * 2.0 * jitter_factor;
                    ((base_delay as f64) * (1.0 + jitter)) as u64
                } else {
                    base_delay
                }
                .min(config.max_delay_ms);

                warn!(
                    operation = operation_name,
                    attempt = attempt,
                    error = %err,
                    delay_ms = actual_delay,
                    "Operation failed, retrying"
                );

                sleep(Duration::from_millis(actual_delay)).await;

                delay = ((delay as f64) * config.backoff_multiplier) as u64;
                delay = delay.min(config.max_delay_ms);
            }
        }
    }
}

/// Timeout wrapper for async operations
pub async fn with_timeout<F, T>(
    future: F,
    duration: Duration,
    operation_name: &str,
) -> DossierResult<T>
where
    F: Future<Output = T>,
{
    match timeout(duration, future).await {
        Ok(result) => Ok(result),
        Err(_) => Err(DossierError::Timeout {
            operation: operation_name.to_string(),
            duration_ms: duration.as_millis() as u64,
            context: ErrorContext::new("async_utils")
                .with_operation("timeout")
                .with_metadata("timeout_ms", &duration.as_millis().to_string())
                .with_suggestion("Increase timeout duration")
                .with_suggestion("Check network connectivity"),
        }),
    }
}

/// Concurrency limiter for outbound calls.
///
/// Cloning shares the same permits, so overlapping callers are limited together.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    permits: Arc<tokio::sync::Semaphore>,
}

impl RateLimiter {
    /// Create a limiter allowing `max_concurrent` callers at once (at least one)
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            permits: Arc::new(tokio::sync::Semaphore::new(max_concurrent.max(1))),
        }
    }

    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Wait for a free permit; it is released when the guard drops
    pub async fn acquire(&self) -> DossierResult<RateLimitGuard> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| DossierError::Internal {
                message: format!("Failed to acquire rate limit permit: {}", e),
                source: Some(Box::new(e)),
                context: ErrorContext::new("rate_limiter").with_operation("acquire"),
            })?;

        Ok(RateLimitGuard { _permit: permit })
    }
}

/// RAII guard for rate limiter permits
pub struct RateLimitGuard {
    _permit: tokio::sync::OwnedSemaphorePermit,
}

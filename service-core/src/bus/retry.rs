//! Bus client retry utilities for service-to-service communication.
//!
//! Provides configurable retry logic with exponential backoff for bus calls.

use super::BusError;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// Configuration for retry behavior.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not including the initial attempt).
    pub max_retries: u32,
    /// Initial backoff duration before first retry.
    pub initial_backoff: Duration,
    /// Maximum backoff duration.
    pub max_backoff: Duration,
    /// Backoff multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to backoff duration.
    pub add_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }
}

impl RetryConfig {
    /// Create a new retry config with the specified max retries.
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// Create a config with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Calculate backoff duration for a given attempt.
    fn backoff_duration(&self, attempt: u32) -> Duration {
        let backoff =
            self.initial_backoff.as_millis() as f64 * self.backoff_multiplier.powi(attempt as i32);
        let backoff_ms = backoff.min(self.max_backoff.as_millis() as f64) as u64;

        let mut duration = Duration::from_millis(backoff_ms);

        if self.add_jitter {
            // Add up to 25% jitter
            let jitter = (backoff_ms as f64 * 0.25 * rand_jitter()) as u64;
            duration += Duration::from_millis(jitter);
        }

        duration
    }
}

/// Simple pseudo-random jitter (0.0 to 1.0) without external dependencies.
fn rand_jitter() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    (nanos % 1000) as f64 / 1000.0
}

/// Determines if a bus error is retryable.
pub fn is_retryable(err: &BusError) -> bool {
    matches!(
        err,
        BusError::Timeout { .. }        // Deadline exceeded, can retry
        | BusError::NoResponders(_)     // Service temporarily absent
        | BusError::Request(_) // Transport-level failure, may be transient
    )
}

/// Determines if a bus error is definitely not retryable.
pub fn is_permanent_failure(err: &BusError) -> bool {
    matches!(
        err,
        BusError::Encode(_)          // Our payload will not get better
        | BusError::Decode { .. }    // Reply shape mismatch
        | BusError::Upstream { .. }  // Application-level rejection
        | BusError::Connect { .. } // Connection setup failed outright
    )
}

/// Execute a bus call with retry logic.
///
/// # Arguments
/// * `config` - Retry configuration
/// * `operation_name` - Name of the operation for logging
/// * `f` - The async function that performs the bus call
pub async fn retry_request<F, Fut, T>(
    config: &RetryConfig,
    operation_name: &str,
    f: F,
) -> Result<T, BusError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, BusError>>,
{
    let mut attempt = 0;

    loop {
        match f().await {
            Ok(result) => {
                if attempt > 0 {
                    info!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        "bus call succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) => {
                if attempt >= config.max_retries {
                    warn!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        error = %err,
                        "bus call failed after max retries"
                    );
                    return Err(err);
                }

                if is_permanent_failure(&err) || !is_retryable(&err) {
                    warn!(
                        operation = operation_name,
                        error = %err,
                        "bus call failed with non-retryable error"
                    );
                    return Err(err);
                }

                let backoff = config.backoff_duration(attempt);
                warn!(
                    operation = operation_name,
                    attempt = attempt + 1,
                    error = %err,
                    backoff_ms = backoff.as_millis(),
                    "bus call failed, retrying after backoff"
                );

                sleep(backoff).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timeout_err() -> BusError {
        BusError::Timeout {
            subject: "validate_products".to_string(),
            elapsed: Duration::from_secs(2),
        }
    }

    fn upstream_err() -> BusError {
        BusError::Upstream {
            status: 400,
            message: "rejected".to_string(),
        }
    }

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.initial_backoff, Duration::from_millis(100));
    }

    #[test]
    fn test_backoff_duration() {
        let config = RetryConfig {
            add_jitter: false,
            ..Default::default()
        };

        assert_eq!(config.backoff_duration(0), Duration::from_millis(100));
        assert_eq!(config.backoff_duration(1), Duration::from_millis(200));
        assert_eq!(config.backoff_duration(2), Duration::from_millis(400));
    }

    #[test]
    fn test_backoff_is_capped() {
        let config = RetryConfig {
            add_jitter: false,
            max_backoff: Duration::from_millis(300),
            ..Default::default()
        };

        assert_eq!(config.backoff_duration(5), Duration::from_millis(300));
    }

    #[test]
    fn test_is_retryable() {
        assert!(is_retryable(&timeout_err()));
        assert!(is_retryable(&BusError::NoResponders("subject".into())));
        assert!(!is_retryable(&upstream_err()));
        assert!(!is_retryable(&BusError::Encode("bad".into())));
    }

    #[test]
    fn test_is_permanent_failure() {
        assert!(is_permanent_failure(&upstream_err()));
        assert!(is_permanent_failure(&BusError::Decode {
            subject: "s".into(),
            detail: "d".into()
        }));
        assert!(!is_permanent_failure(&timeout_err()));
    }

    #[tokio::test]
    async fn test_retry_success_first_attempt() {
        let config = RetryConfig::default();
        let result = retry_request(&config, "test_op", || async { Ok::<_, BusError>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_retry_permanent_failure() {
        let config = RetryConfig::with_max_retries(2);
        let result = retry_request(&config, "test_op", || async {
            Err::<i32, _>(upstream_err())
        })
        .await;
        assert!(matches!(
            result.unwrap_err(),
            BusError::Upstream { status: 400, .. }
        ));
    }

    #[tokio::test]
    async fn test_retry_exhaustion_returns_last_error() {
        let config = RetryConfig {
            max_retries: 2,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            backoff_multiplier: 1.0,
            add_jitter: false,
        };
        let attempts = std::sync::atomic::AtomicU32::new(0);
        let result = retry_request(&config, "test_op", || {
            attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async { Err::<i32, _>(timeout_err()) }
        })
        .await;
        assert!(matches!(result.unwrap_err(), BusError::Timeout { .. }));
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 3);
    }
}

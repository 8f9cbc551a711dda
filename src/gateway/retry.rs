use crate::gateway::errors::GatewayError;
use std::time::Duration;
use tokio::time::sleep;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not including the initial attempt).
    pub max_retries: u32,
    /// Initial delay before the first retry (in milliseconds).
    pub initial_delay_ms: u64,
    /// Maximum delay between retries (in milliseconds).
    pub max_delay_ms: u64,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
        }
    }
}

/// Retry budget dedicated to schema-mismatch correction. The error handling
/// design allows exactly one corrective retry with the validation failure
/// appended to the prompt before a call is treated as a hard failure.
pub const SCHEMA_CORRECTION_RETRIES: u32 = 1;

/// Retry an async operation with exponential backoff.
///
/// Rate-limit and budget-exhaustion failures are never retried here: a
/// rate limit is handled by the caller waiting on the token bucket before
/// attempting the call at all, and an exhausted budget can only get worse.
pub async fn retry_with_backoff<F, Fut, T>(
    mut operation: F,
    config: RetryConfig,
) -> Result<T, GatewayError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, GatewayError>>,
{
    let mut last_error: Option<GatewayError> = None;
    let mut delay_ms = config.initial_delay_ms;

    for attempt in 0..=config.max_retries {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    log::info!("gateway call succeeded after {} retries", attempt);
                }
                return Ok(result);
            }
            Err(error) => {
                if !error.is_retryable() {
                    log::warn!("non-retryable gateway error: {}", error);
                    return Err(error);
                }

                last_error = Some(error.clone());

                if attempt >= config.max_retries {
                    log::warn!(
                        "gateway call failed after {} attempts, last error: {}",
                        attempt + 1,
                        error
                    );
                    break;
                }

                log::info!(
                    "gateway call failed (attempt {}/{}): {}. retrying in {}ms",
                    attempt + 1,
                    config.max_retries + 1,
                    error,
                    delay_ms
                );

                sleep(Duration::from_millis(delay_ms)).await;
                delay_ms = ((delay_ms as f64) * config.backoff_multiplier) as u64;
                delay_ms = delay_ms.min(config.max_delay_ms);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| GatewayError::Unknown("retries exhausted".to_string())))
}

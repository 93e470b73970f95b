use std::time::Duration;
use std::future::Future;

use super::types::LanternError;
use tracing::warn;

const MAX_DELAY: Duration = Duration::from_secs(30);

/// Retry configuration for storage and network operations.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `attempt` (0-indexed): exponential backoff
    /// from `base_delay` plus up to one `base_delay` of random jitter,
    /// capped at 30s.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_secs_f64();
        let backoff = base * 2.0_f64.powi(attempt.min(16) as i32);
        let jitter = base * rand::random::<f64>();
        Duration::from_secs_f64(backoff + jitter).min(MAX_DELAY)
    }
}

/// Execute an operation with retry logic.
///
/// Retries only if the error is classified as retryable and we haven't
/// exceeded max_retries.
pub async fn with_retry<F, Fut, T>(
    operation_name: &str,
    config: &RetryConfig,
    mut factory: F,
) -> Result<T, LanternError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LanternError>>,
{
    let max_attempts = config.max_retries + 1;
    let mut attempt = 0;

    loop {
        match factory().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                let classification = e.classify();

                if !classification.retryable {
                    warn!(
                        operation = operation_name,
                        error_type = classification.error_type,
                        "Non-retryable error, failing immediately"
                    );
                    return Err(e);
                }
                if attempt + 1 >= max_attempts {
                    warn!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        max = max_attempts,
                        "Max retries exhausted"
                    );
                    return Err(e);
                }

                let delay = config.retry_delay(attempt);
                warn!(
                    operation = operation_name,
                    attempt = attempt + 1,
                    max = max_attempts,
                    error_type = classification.error_type,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retrying after error"
                );

                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

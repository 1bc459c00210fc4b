use crate::config::RetrySettings;
use crate::error::StoreError;
use std::future::Future;
use std::time::Duration;

const MAX_BACKOFF: Duration = Duration::from_secs(5);

pub fn backoff_delay(settings: &RetrySettings, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1).min(16));
    settings.base_delay.saturating_mul(factor).min(MAX_BACKOFF)
}

/// Runs a store call, retrying transient failures with exponential backoff.
/// Non-transient errors are returned immediately.
pub async fn with_backoff<T, F, Fut>(settings: &RetrySettings, op: &str, mut call: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let attempts = settings.attempts.max(1);
    let mut attempt = 1;
    loop {
        match call().await {
            Ok(v) => return Ok(v),
            Err(err) if err.is_transient() && attempt < attempts => {
                let delay = backoff_delay(settings, attempt);
                tracing::warn!(
                    op,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "store call failed, retrying: {}",
                    err
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

use super::EngineError;
use tokio::time::{sleep, Duration};
use tracing::warn;

/// Retries a fallible async operation with exponential backoff.
///
/// The delay starts at `initial_delay_ms` and doubles after each failed
/// attempt. `max_attempts` counts the first try, so `max_attempts = 3` makes
/// at most two waits (base and doubled).
pub async fn retry_with_backoff<F, Fut, T>(
    operation: F,
    max_attempts: u32,
    initial_delay_ms: u64,
) -> std::result::Result<T, EngineError>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = std::result::Result<T, EngineError>>,
{
    let mut delay_ms = initial_delay_ms;

    for attempt in 1..=max_attempts {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt == max_attempts => return Err(e),
            Err(e) => {
                warn!(attempt, delay_ms, error = %e, "Operation failed, retrying");
                sleep(Duration::from_millis(delay_ms)).await;
                delay_ms *= 2;
            }
        }
    }

    unreachable!("retry loop always returns within max_attempts")
}

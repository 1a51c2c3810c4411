//! Generic retry-with-backoff combinator. Grounded on
//! `vclip-worker/src/retry.rs::retry_async`, generalized to take the delay
//! function as a parameter rather than a fixed formula, since this crate
//! needs two distinct backoff curves: `min(30s, 2^(attempt-1)s)` for
//! extraction attempts (spec §4.8) and `min(10s, 1s*2^(k-2))` for webhook
//! delivery attempts (spec §4.10).

use std::future::Future;
use std::time::Duration;

use tracing::debug;

#[derive(Debug)]
pub enum RetryResult<T, E> {
    Success(T),
    Failed { error: E, attempts: u32 },
}

impl<T, E> RetryResult<T, E> {
    pub fn is_success(&self) -> bool {
        matches!(self, RetryResult::Success(_))
    }
}

/// Run `operation` up to `max_attempts` times (attempt numbers are 1-based).
/// `delay_for` computes the sleep *before* a given attempt number; it is
/// not called before attempt 1. Stops retrying early if `is_permanent`
/// returns true for the error.
pub async fn retry_async<F, Fut, T, E>(
    max_attempts: u32,
    delay_for: impl Fn(u32) -> Duration,
    is_permanent: impl Fn(&E) -> bool,
    operation_name: &str,
    operation: F,
) -> RetryResult<T, E>
where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 1u32;
    loop {
        match operation(attempt).await {
            Ok(value) => return RetryResult::Success(value),
            Err(e) if attempt >= max_attempts || is_permanent(&e) => {
                return RetryResult::Failed { error: e, attempts: attempt }
            }
            Err(e) => {
                let next = attempt + 1;
                let delay = delay_for(next);
                debug!(
                    "{operation_name} attempt {attempt} failed, retrying in {delay:?}: {e}"
                );
                tokio::time::sleep(delay).await;
                attempt = next;
            }
        }
    }
}

/// `wait = min(30s, 2^(attempt-1)s)` — spec §4.8's extraction backoff.
pub fn extraction_backoff(attempt: u32) -> Duration {
    let secs = 2u64.saturating_pow(attempt.saturating_sub(1));
    Duration::from_secs(secs.min(30))
}

/// `min(MAX_BACKOFF, BASE_BACKOFF * 2^(k-2))`, BASE=1s, MAX=10s, for k>=2.
/// Spec §4.10's webhook backoff; called only before attempts 2 and 3.
pub fn webhook_backoff(attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(2);
    let secs = 2u64.saturating_pow(exp);
    Duration::from_secs(secs.min(10))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_backoff_matches_formula() {
        assert_eq!(extraction_backoff(1), Duration::from_secs(1));
        assert_eq!(extraction_backoff(2), Duration::from_secs(2));
        assert_eq!(extraction_backoff(3), Duration::from_secs(4));
        assert_eq!(extraction_backoff(6), Duration::from_secs(30));
        assert_eq!(extraction_backoff(10), Duration::from_secs(30));
    }

    #[test]
    fn webhook_backoff_matches_formula() {
        assert_eq!(webhook_backoff(2), Duration::from_secs(1));
        assert_eq!(webhook_backoff(3), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn retry_async_succeeds_eventually() {
        let attempts = std::sync::atomic::AtomicU32::new(0);
        let result = retry_async(
            3,
            extraction_backoff,
            |_: &&str| false,
            "test",
            |_attempt| {
                let n = attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                async move {
                    if n < 1 {
                        Err("transient")
                    } else {
                        Ok(42)
                    }
                }
            },
        )
        .await;

        assert!(result.is_success());
    }

    #[tokio::test]
    async fn retry_async_stops_on_permanent_error() {
        let attempts = std::sync::atomic::AtomicU32::new(0);
        let result = retry_async(
            3,
            extraction_backoff,
            |e: &&str| *e == "permanent",
            "test",
            |_attempt| {
                attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                async { Err::<(), _>("permanent") }
            },
        )
        .await;

        assert!(!result.is_success());
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}

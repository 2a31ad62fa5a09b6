//! C3 — the Retry Handler: retries a single model call on transient
//! failures only (`transient_http`, `rate_limited`), with exponential
//! backoff and ±20% jitter. Every other `ErrorKind` returns immediately so
//! C4 can move to the next model in the fallback chain without delay.

use std::future::Future;

use rand::Rng;

use crate::error::CallError;

/// Run `attempt` up to `max_attempts` times (inclusive of the first try).
/// `initial_delay_secs` doubles after each retriable failure; jitter is
/// applied multiplicatively in `[0.8, 1.2)` so concurrent pages don't retry
/// in lockstep.
pub async fn retry_with_backoff<F, Fut>(
    max_attempts: u32,
    initial_delay_secs: f64,
    mut attempt: F,
) -> Result<String, CallError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<String, CallError>>,
{
    let mut delay = initial_delay_secs.max(0.001);
    let mut last_err = None;

    for try_number in 1..=max_attempts.max(1) {
        match attempt().await {
            Ok(content) => return Ok(content),
            Err(e) => {
                let retryable = e.kind.is_retryable();
                last_err = Some(e);
                if !retryable || try_number == max_attempts {
                    break;
                }
                let jitter = rand::thread_rng().gen_range(0.8..1.2);
                tokio::time::sleep(std::time::Duration::from_secs_f64(delay * jitter)).await;
                delay *= 2.0;
            }
        }
    }

    Err(last_err.expect("loop runs at least once"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn succeeds_without_retry_on_first_try() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(3, 1.0, || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok("ok".to_string())
            }
        })
        .await;
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_failures_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(3, 0.01, || {
            let c = Arc::clone(&c);
            async move {
                let n = c.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(CallError::new(ErrorKind::TransientHttp, "m", "boom"))
                } else {
                    Ok("recovered".to_string())
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), "recovered");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(3, 0.01, || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(CallError::new(ErrorKind::TransientHttp, "m", "still failing"))
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn does_not_retry_non_retryable_kind() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(5, 0.01, || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(CallError::new(ErrorKind::AuthFailure, "m", "no creds"))
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

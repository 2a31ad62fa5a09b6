//! C2 — a shared token-bucket rate limiter bounding LLM calls per minute
//! across the whole run, independent of the Orchestrator's page-concurrency
//! semaphore: concurrency and call rate are orthogonal knobs, each tuned on
//! its own.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

/// Token bucket: capacity equals `rate_limit_per_minute`, refilling
/// continuously at `rate_limit_per_minute / 60` tokens per second.
/// `acquire()` suspends the caller (via `tokio::time::sleep`, never a busy
/// loop) until a token is available, then debits one.
pub struct RateLimiter {
    state: Mutex<State>,
    capacity: f64,
    refill_per_sec: f64,
}

struct State {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    pub fn new(rate_limit_per_minute: u32) -> Self {
        let capacity = rate_limit_per_minute.max(1) as f64;
        Self {
            state: Mutex::new(State {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
            capacity,
            refill_per_sec: capacity / 60.0,
        }
    }

    /// Suspend until one token is available, then consume it. Cancellation
    /// (the future being dropped) returns the token to nobody — no partial
    /// debit occurs, matching the "no token return on cancel" rule.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().unwrap();
                self.refill(&mut state);
                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    None
                } else {
                    let deficit = 1.0 - state.tokens;
                    Some(Duration::from_secs_f64(deficit / self.refill_per_sec))
                }
            };
            match wait {
                None => return,
                Some(d) => tokio::time::sleep(d.max(Duration::from_millis(1))).await,
            }
        }
    }

    /// Like [`Self::acquire`], but also races a cancellation signal: returns
    /// `false` the moment `token` is cancelled instead of continuing to wait
    /// for the next refill. Returns `true` once a token was actually debited.
    pub async fn acquire_cancellable(&self, token: &CancellationToken) -> bool {
        tokio::select! {
            biased;
            _ = token.cancelled() => false,
            _ = self.acquire() => true,
        }
    }

    fn refill(&self, state: &mut State) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        state.last_refill = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn acquires_immediately_while_tokens_available() {
        let limiter = RateLimiter::new(60);
        for _ in 0..60 {
            limiter.acquire().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_cancellable_returns_false_immediately_when_already_cancelled() {
        let limiter = RateLimiter::new(60);
        let token = CancellationToken::new();
        token.cancel();
        assert!(!limiter.acquire_cancellable(&token).await);
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_cancellable_returns_true_when_a_token_is_available() {
        let limiter = RateLimiter::new(60);
        let token = CancellationToken::new();
        assert!(limiter.acquire_cancellable(&token).await);
    }

    #[tokio::test(start_paused = true)]
    async fn blocks_and_resumes_after_refill() {
        use std::sync::Arc;

        let limiter = Arc::new(RateLimiter::new(60));
        for _ in 0..60 {
            limiter.acquire().await;
        }

        let limiter2 = Arc::clone(&limiter);
        let handle = tokio::spawn(async move {
            limiter2.acquire().await;
        });

        tokio::time::advance(Duration::from_secs(2)).await;
        handle.await.unwrap();
    }
}

//! Token-bucket rate limiter (spec component C9/§4.10): a single mutex
//! guards `(capacity, rate_per_sec, tokens, last)`; `allow` is the
//! non-blocking check the HTTP pipeline uses, `wait` is kept for callers
//! willing to queue rather than reject.

use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

struct State {
    tokens: f64,
    last: Instant,
}

pub struct TokenBucket {
    capacity: f64,
    rate_per_sec: f64,
    state: Mutex<State>,
}

impl TokenBucket {
    /// Starts full, per spec.
    pub fn new(capacity: f64, rate_per_sec: f64) -> Self {
        Self {
            capacity,
            rate_per_sec,
            state: Mutex::new(State {
                tokens: capacity,
                last: Instant::now(),
            }),
        }
    }

    fn refill_locked(&self, state: &mut State, now: Instant) {
        let elapsed = now.saturating_duration_since(state.last).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.rate_per_sec).min(self.capacity);
        state.last = now;
    }

    /// Refill then atomically subtract `n` if available.
    pub fn allow(&self, n: f64) -> bool {
        let mut state = self.state.lock();
        self.refill_locked(&mut state, Instant::now());
        if state.tokens >= n {
            state.tokens -= n;
            true
        } else {
            false
        }
    }

    /// Refill; if short, sleep for the computed deficit and retry, or
    /// return early if `cancel` fires first.
    pub async fn wait(&self, n: f64, cancel: &CancellationToken) -> bool {
        loop {
            let deficit = {
                let mut state = self.state.lock();
                self.refill_locked(&mut state, Instant::now());
                if state.tokens >= n {
                    state.tokens -= n;
                    return true;
                }
                (n - state.tokens) / self.rate_per_sec
            };
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs_f64(deficit.max(0.0))) => {}
                _ = cancel.cancelled() => return false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_full_and_drains() {
        let bucket = TokenBucket::new(5.0, 1.0);
        for _ in 0..5 {
            assert!(bucket.allow(1.0));
        }
        assert!(!bucket.allow(1.0));
    }

    #[test]
    fn never_exceeds_capacity_on_refill() {
        let bucket = TokenBucket::new(2.0, 100.0);
        assert!(bucket.allow(2.0));
        std::thread::sleep(Duration::from_millis(50));
        assert!(bucket.allow(2.0));
        assert!(!bucket.allow(1.0));
    }

    #[tokio::test]
    async fn wait_returns_once_tokens_available() {
        let bucket = TokenBucket::new(1.0, 1000.0);
        assert!(bucket.allow(1.0));
        let cancel = CancellationToken::new();
        assert!(bucket.wait(1.0, &cancel).await);
    }

    #[tokio::test]
    async fn wait_aborts_on_cancel() {
        let bucket = TokenBucket::new(1.0, 0.001);
        assert!(bucket.allow(1.0));
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(!bucket.wait(1.0, &cancel).await);
    }
}

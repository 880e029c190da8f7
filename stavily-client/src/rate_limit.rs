//! Token bucket rate limiter for outbound Transport calls.
//!
//! Rate `R` requests/second, burst capacity `max(2R, 10)`, refilling at a
//! steady period of `1/R`. Callers block on [`RateLimiter::acquire`]
//! until a token is available or the shared cancellation token fires.

use std::sync::Mutex;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::error::{ClientError, Result};

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// A token bucket shared across all Transport calls for one client.
pub struct RateLimiter {
    rate_per_sec: f64,
    capacity: f64,
    state: Mutex<BucketState>,
}

impl RateLimiter {
    pub fn new(rate_per_sec: f64) -> Self {
        let capacity = (2.0 * rate_per_sec).max(10.0);
        Self {
            rate_per_sec,
            capacity,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Attempts to take one token, refilling based on elapsed time first.
    /// Returns the wait duration the caller should sleep before retrying
    /// if no token was available.
    fn try_acquire(&self) -> Option<Duration> {
        let mut state = self.state.lock().unwrap();
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.rate_per_sec).min(self.capacity);
        state.last_refill = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            None
        } else {
            let deficit = 1.0 - state.tokens;
            Some(Duration::from_secs_f64(deficit / self.rate_per_sec))
        }
    }

    /// Blocks until a token is available, or returns `ClientError::Cancelled`
    /// if `cancel` fires first.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<()> {
        loop {
            match self.try_acquire() {
                None => return Ok(()),
                Some(wait) => {
                    tokio::select! {
                        _ = tokio::time::sleep(wait) => continue,
                        _ = cancel.cancelled() => return Err(ClientError::Cancelled),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn burst_capacity_allows_immediate_requests() {
        let limiter = RateLimiter::new(5.0);
        let cancel = CancellationToken::new();
        // capacity = max(2*5, 10) = 10
        for _ in 0..10 {
            limiter.acquire(&cancel).await.unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_bucket_waits_for_refill() {
        let limiter = RateLimiter::new(1.0);
        let cancel = CancellationToken::new();
        for _ in 0..10 {
            limiter.acquire(&cancel).await.unwrap();
        }
        let start = Instant::now();
        limiter.acquire(&cancel).await.unwrap();
        assert!(Instant::now().duration_since(start) >= Duration::from_millis(900));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_aborts_wait() {
        let limiter = RateLimiter::new(1.0);
        let cancel = CancellationToken::new();
        for _ in 0..10 {
            limiter.acquire(&cancel).await.unwrap();
        }
        cancel.cancel();
        let err = limiter.acquire(&cancel).await.unwrap_err();
        assert!(matches!(err, ClientError::Cancelled));
    }
}

// ABOUTME: Per-connection send-rate limiting with a token bucket refilled at the profile's speed
// ABOUTME: Waiters are served in arrival order and suspend only their own task

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::trace;

/// Token bucket holding at most `per_second` permits, refilled continuously
/// at `per_second` permits per second.
///
/// The bucket starts empty, so a burst of M parts takes about M / speed
/// seconds even on a freshly bound session.
#[derive(Debug)]
pub struct RateLimiter {
    per_second: u32,
    bucket: Mutex<Bucket>,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn refill(&mut self, now: Instant, rate: f64) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rate).min(rate);
        self.last_refill = now;
    }
}

impl RateLimiter {
    /// `per_second` must be non-zero; profiles with speed 0 are rejected at load.
    pub fn new(per_second: u32) -> Self {
        Self {
            per_second: per_second.max(1),
            bucket: Mutex::new(Bucket {
                tokens: 0.0,
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn per_second(&self) -> u32 {
        self.per_second
    }

    /// Wait for one permit and consume it.
    pub async fn acquire(&self) {
        let rate = f64::from(self.per_second);

        // The tokio mutex is fair, so concurrent callers get permits in order.
        let mut bucket = self.bucket.lock().await;
        bucket.refill(Instant::now(), rate);

        if bucket.tokens < 1.0 {
            let wait = Duration::from_secs_f64((1.0 - bucket.tokens) / rate);
            trace!("Rate limit reached, waiting {:?}", wait);
            tokio::time::sleep(wait).await;
            bucket.refill(Instant::now(), rate);
        }

        bucket.tokens = (bucket.tokens - 1.0).max(0.0);
    }
}

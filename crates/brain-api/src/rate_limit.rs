//! Per-phase token-bucket rate limiting for signal intake.

use std::sync::Mutex;
use std::time::Instant;

use brain_core::PhaseId;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// One bucket per phase: sustained `rate` signals/second with a burst of
/// twice that.
pub struct PhaseRateLimiter {
    rate: f64,
    burst: f64,
    buckets: [Mutex<Bucket>; 3],
}

impl PhaseRateLimiter {
    pub fn new(rate_per_second: u32) -> Self {
        let rate = rate_per_second as f64;
        let burst = rate * 2.0;
        let bucket = || {
            Mutex::new(Bucket {
                tokens: burst,
                last_refill: Instant::now(),
            })
        };
        Self {
            rate,
            burst,
            buckets: [bucket(), bucket(), bucket()],
        }
    }

    /// Take one token for the phase. False means the caller gets a 429.
    pub fn try_acquire(&self, phase: PhaseId) -> bool {
        let mut bucket = self.buckets[phase.index()]
            .lock()
            .expect("rate limit lock poisoned");
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate).min(self.burst);
        bucket.last_refill = now;
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

//! Client-side request throttling
//!
//! A token bucket matching the `--qps` / `--burst` knobs of the CLI: up to
//! `burst` requests go out immediately, after which requests are spaced at
//! `qps` per second.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Default sustained request rate
pub const DEFAULT_QPS: f32 = 50.0;
/// Default burst size
pub const DEFAULT_BURST: u32 = 100;
/// Lowest sustained rate a limiter will throttle to
pub const MIN_QPS: f32 = 0.001;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket rate limiter shared by all calls of one resource store
#[derive(Debug)]
pub struct RateLimiter {
    qps: f64,
    burst: f64,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    /// Create a limiter allowing `qps` requests per second with bursts of `burst`.
    ///
    /// A non-positive or non-finite `qps` disables throttling. A positive
    /// `qps` below [`MIN_QPS`] is raised to it.
    pub fn new(qps: f32, burst: u32) -> Self {
        let burst = f64::from(burst.max(1));
        let qps = if qps.is_finite() && qps > 0.0 {
            f64::from(qps.max(MIN_QPS))
        } else {
            0.0
        };
        Self {
            qps,
            burst,
            bucket: Mutex::new(Bucket {
                tokens: burst,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Whether this limiter ever delays requests
    pub fn is_enabled(&self) -> bool {
        self.qps > 0.0
    }

    /// Wait until a request may be sent
    pub async fn acquire(&self) {
        if !self.is_enabled() {
            return;
        }

        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                let now = Instant::now();
                let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
                bucket.tokens = (bucket.tokens + elapsed * self.qps).min(self.burst);
                bucket.last_refill = now;

                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    return;
                }

                Duration::from_secs_f64((1.0 - bucket.tokens) / self.qps)
            };

            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_burst_is_immediate() {
        let limiter = RateLimiter::new(1.0, 3);
        let start = Instant::now();

        for _ in 0..3 {
            limiter.acquire().await;
        }

        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_requests_beyond_burst_are_spaced() {
        let limiter = RateLimiter::new(2.0, 1);
        let start = Instant::now();

        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;

        // two refills at 2 qps
        assert!(start.elapsed() >= Duration::from_millis(1000));
        assert!(start.elapsed() < Duration::from_millis(1100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_qps_never_waits() {
        let limiter = RateLimiter::new(0.0, 1);
        assert!(!limiter.is_enabled());
        let start = Instant::now();

        for _ in 0..1000 {
            limiter.acquire().await;
        }

        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tiny_qps_waits_a_bounded_time() {
        let limiter = RateLimiter::new(1e-20, 1);
        assert!(limiter.is_enabled());
        let start = Instant::now();

        limiter.acquire().await;
        limiter.acquire().await;

        // one refill at MIN_QPS
        assert!(start.elapsed() >= Duration::from_secs(999));
        assert!(start.elapsed() < Duration::from_secs(1001));
    }

    #[test]
    fn test_non_finite_qps_disables_throttling() {
        assert!(!RateLimiter::new(f32::NAN, 10).is_enabled());
        assert!(!RateLimiter::new(f32::INFINITY, 10).is_enabled());
        assert!(!RateLimiter::new(-5.0, 10).is_enabled());
    }

    #[test]
    fn test_zero_burst_is_treated_as_one() {
        let limiter = RateLimiter::new(10.0, 0);
        assert_eq!(limiter.burst, 1.0);
    }
}

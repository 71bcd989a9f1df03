use std::collections::HashMap;

use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};
use uuid::Uuid;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Per-stream token buckets with lazy refill.
///
/// Buckets refill continuously at `per_second` based on elapsed wall time
/// since the last refill, capped at one second of burst. When a bucket is
/// empty, `acquire` sleeps until the next whole token accrues and retries.
///
/// Per-process: with N workers the aggregate rate is N x per_second.
#[derive(Default)]
pub struct RateLimiter {
    buckets: Mutex<HashMap<Uuid, Bucket>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Take one token for `stream_id`, waiting as long as necessary.
    /// `per_second` below 1 is treated as 1.
    pub async fn acquire(&self, stream_id: Uuid, per_second: u32) {
        let rate = per_second.max(1) as f64;

        loop {
            let wait = {
                let mut buckets = self.buckets.lock().await;
                let now = Instant::now();
                let bucket = buckets.entry(stream_id).or_insert(Bucket {
                    tokens: rate,
                    last_refill: now,
                });

                let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
                bucket.tokens = (bucket.tokens + elapsed * rate).min(rate);
                bucket.last_refill = now;

                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    None
                } else {
                    Some(Duration::from_secs_f64((1.0 - bucket.tokens) / rate))
                }
            };

            match wait {
                None => return,
                Some(delay) => tokio::time::sleep(delay).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn burst_within_rate_is_immediate() {
        let limiter = RateLimiter::new();
        let stream = Uuid::new_v4();
        let start = Instant::now();
        for _ in 0..10 {
            limiter.acquire(stream, 10).await;
        }
        assert!(start.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn third_acquire_at_two_per_second_waits_half_a_second() {
        let limiter = RateLimiter::new();
        let stream = Uuid::new_v4();
        let start = Instant::now();
        limiter.acquire(stream, 2).await;
        limiter.acquire(stream, 2).await;
        limiter.acquire(stream, 2).await;
        let elapsed = start.elapsed();
        assert!(
            elapsed >= Duration::from_millis(490),
            "third token must wait ~500ms, waited {elapsed:?}"
        );
        assert!(elapsed < Duration::from_millis(700));
    }

    #[tokio::test(start_paused = true)]
    async fn buckets_are_independent_per_stream() {
        let limiter = RateLimiter::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        limiter.acquire(a, 1).await;

        // Stream A is drained, B is untouched.
        let start = Instant::now();
        limiter.acquire(b, 1).await;
        assert!(start.elapsed() < Duration::from_millis(10));

        let start = Instant::now();
        limiter.acquire(a, 1).await;
        assert!(start.elapsed() >= Duration::from_millis(990));
    }
}

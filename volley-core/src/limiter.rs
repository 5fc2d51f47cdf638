//! Aggregate request pacing shared by every worker.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota};

/// Paces request issuance to a total rate across all workers.
///
/// Backed by a lock-free GCRA cell, so concurrent `acquire` calls never queue
/// behind a mutex. With a burst of one, the first permit is immediate and the
/// rest are spaced `1 / rate` apart.
pub struct RateLimiter {
    limiter: Option<DefaultDirectRateLimiter>,
    rate: Option<u64>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(rate: Option<u64>) -> Self {
        let rate = rate.filter(|rps| *rps > 0);
        let limiter = rate
            .and_then(|rps| Quota::with_period(Duration::from_secs_f64(1.0 / rps as f64)))
            .map(|quota| DefaultDirectRateLimiter::direct(quota.allow_burst(NonZeroU32::MIN)));
        Self { limiter, rate }
    }

    /// Waits for a permit, returning immediately when no rate is set.
    pub async fn acquire(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("rate", &self.rate)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    #[test]
    fn disabled_without_rate() {
        assert!(RateLimiter::new(None).limiter.is_none());
        assert!(RateLimiter::new(Some(0)).limiter.is_none());
        let limited = RateLimiter::new(Some(10));
        assert!(limited.limiter.is_some());
        assert_eq!(limited.rate, Some(10));
    }

    #[tokio::test]
    async fn unlimited_never_waits() {
        let limiter = RateLimiter::new(None);
        let started = Instant::now();
        for _ in 0..10_000 {
            limiter.acquire().await;
        }
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn spaces_permits_by_period() {
        let limiter = RateLimiter::new(Some(20));
        let started = Instant::now();
        for _ in 0..5 {
            limiter.acquire().await;
        }
        // first permit is free, the next four are 50ms apart
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(190), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(400), "{elapsed:?}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn shared_rate_converges_across_tasks() {
        let limiter = Arc::new(RateLimiter::new(Some(200)));
        let issued = Arc::new(AtomicU64::new(0));
        let deadline = Instant::now() + Duration::from_secs(1);
        let mut tasks = Vec::new();
        for _ in 0..32 {
            let limiter = Arc::clone(&limiter);
            let issued = Arc::clone(&issued);
            tasks.push(tokio::spawn(async move {
                let mut mine = 0u64;
                loop {
                    limiter.acquire().await;
                    if Instant::now() >= deadline {
                        return mine;
                    }
                    issued.fetch_add(1, Ordering::Relaxed);
                    mine += 1;
                }
            }));
        }
        let mut per_task = Vec::new();
        for t in tasks {
            per_task.push(t.await.unwrap());
        }
        let total = issued.load(Ordering::Relaxed);
        assert!((180..=222).contains(&total), "issued {total}");
        assert_eq!(per_task.iter().sum::<u64>(), total);
        // no task is starved while others make progress
        assert!(per_task.iter().all(|&n| n > 0), "{per_task:?}");
    }
}

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use super::{RateLimitDecision, RateLimitStore};

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    length: Duration,
    count: u32,
}

/// Expired windows are swept once every this many checks.
const SWEEP_EVERY: u64 = 1024;

/// Fixed-window counter held in process memory.
///
/// Counts are not shared between instances, so this backend is only correct
/// for a single server process.
#[derive(Debug, Default)]
pub struct InMemoryRateLimiter {
    windows: DashMap<String, Window>,
    checks: AtomicU64,
}

impl InMemoryRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_at(
        &self,
        key: &str,
        max_attempts: u32,
        window: Duration,
        now: Instant,
    ) -> RateLimitDecision {
        if (self.checks.fetch_add(1, Ordering::Relaxed) + 1) % SWEEP_EVERY == 0 {
            self.purge_at(now);
        }

        let mut entry = self.windows.entry(key.to_string()).or_insert(Window {
            started: now,
            length: window,
            count: 0,
        });

        let elapsed = now.saturating_duration_since(entry.started);
        if elapsed >= window {
            entry.started = now;
            entry.count = 0;
        }
        entry.length = window;

        if entry.count >= max_attempts {
            let elapsed = now.saturating_duration_since(entry.started);
            let remaining_window = window.saturating_sub(elapsed);
            return RateLimitDecision {
                allowed: false,
                remaining: 0,
                retry_after_seconds: ceil_seconds(remaining_window).max(1),
            };
        }

        entry.count += 1;
        RateLimitDecision {
            allowed: true,
            remaining: max_attempts - entry.count,
            retry_after_seconds: 0,
        }
    }

    /// Drops windows that have fully elapsed, each judged by its own length.
    pub fn purge_expired(&self) {
        self.purge_at(Instant::now());
    }

    fn purge_at(&self, now: Instant) {
        self.windows
            .retain(|_, w| now.saturating_duration_since(w.started) < w.length);
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

fn ceil_seconds(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimiter {
    async fn check(
        &self,
        key: &str,
        max_attempts: u32,
        window_seconds: u64,
    ) -> Result<RateLimitDecision, anyhow::Error> {
        Ok(self.check_at(
            key,
            max_attempts,
            Duration::from_secs(window_seconds),
            Instant::now(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fourth_attempt_is_denied() {
        let limiter = InMemoryRateLimiter::new();

        for expected_remaining in [2, 1, 0] {
            let decision = limiter.check("login:a@example.com", 3, 60).await.unwrap();
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected_remaining);
        }

        let denied = limiter.check("login:a@example.com", 3, 60).await.unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        assert!(denied.retry_after_seconds > 0);

        let other = limiter.check("login:b@example.com", 3, 60).await.unwrap();
        assert!(other.allowed);
        assert_eq!(other.remaining, 2);
    }

    #[test]
    fn test_window_resets_after_expiry() {
        let limiter = InMemoryRateLimiter::new();
        let window = Duration::from_secs(10);
        let start = Instant::now();

        assert!(limiter.check_at("k", 1, window, start).allowed);
        assert!(!limiter.check_at("k", 1, window, start + Duration::from_secs(5)).allowed);
        assert!(limiter.check_at("k", 1, window, start + Duration::from_secs(10)).allowed);
    }

    #[test]
    fn test_retry_after_counts_down() {
        let limiter = InMemoryRateLimiter::new();
        let window = Duration::from_secs(60);
        let start = Instant::now();

        limiter.check_at("k", 1, window, start);
        let denied = limiter.check_at("k", 1, window, start + Duration::from_millis(20_500));
        assert_eq!(denied.retry_after_seconds, 40);
    }

    #[test]
    fn test_purge_keeps_live_windows() {
        let limiter = InMemoryRateLimiter::new();
        let start = Instant::now();
        limiter.check_at("short", 5, Duration::from_secs(1), start);
        limiter.check_at("long", 5, Duration::from_secs(3600), start);

        limiter.purge_at(start + Duration::from_secs(2));
        assert_eq!(limiter.len(), 1);
        assert!(limiter.windows.contains_key("long"));
    }

    #[test]
    fn test_map_shrinks_without_explicit_purge() {
        let limiter = InMemoryRateLimiter::new();
        let window = Duration::from_secs(60);
        let start = Instant::now();

        // One key per caller, as a flood of distinct peers would produce.
        for i in 0..SWEEP_EVERY - 1 {
            limiter.check_at(&format!("webhook:peer-{i}"), 5, window, start);
        }
        assert_eq!(limiter.len(), (SWEEP_EVERY - 1) as usize);

        // The next check lands after every earlier window has elapsed.
        limiter.check_at("webhook:late", 5, window, start + Duration::from_secs(61));
        assert_eq!(limiter.len(), 1);
        assert!(limiter.windows.contains_key("webhook:late"));
    }
}

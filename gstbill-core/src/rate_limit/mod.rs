//! Attempt counting keyed by an arbitrary string.
//!
//! One store is built at start-up ([`build_store`]) and shared through
//! `AppState`; callers pass the policy on every check.

pub mod memory;
pub mod middleware;
pub mod redis;

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

pub use self::memory::InMemoryRateLimiter;
pub use self::redis::RedisRateLimiter;

/// Maximum attempts allowed within a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub max_attempts: u32,
    pub window_seconds: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    /// Zero when allowed
    pub retry_after_seconds: u64,
}

#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Records one attempt for `key` and reports whether it is within the limit.
    async fn check(
        &self,
        key: &str,
        max_attempts: u32,
        window_seconds: u64,
    ) -> Result<RateLimitDecision, anyhow::Error>;

    async fn check_policy(
        &self,
        key: &str,
        policy: RateLimitPolicy,
    ) -> Result<RateLimitDecision, anyhow::Error> {
        self.check(key, policy.max_attempts, policy.window_seconds)
            .await
    }
}

/// Picks the Redis backend when a URL is configured, otherwise the in-memory one.
pub async fn build_store(
    redis_url: Option<&str>,
) -> Result<Arc<dyn RateLimitStore>, anyhow::Error> {
    match redis_url {
        Some(url) => {
            let store = RedisRateLimiter::connect(url).await?;
            Ok(Arc::new(store))
        }
        None => {
            info!("REDIS_URL not set; using in-memory rate limiter (single instance only)");
            let store = Arc::new(InMemoryRateLimiter::new());
            spawn_purge(Arc::downgrade(&store), PURGE_INTERVAL);
            Ok(store as Arc<dyn RateLimitStore>)
        }
    }
}

const PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// Sweeps expired windows until the limiter is dropped.
fn spawn_purge(store: Weak<InMemoryRateLimiter>, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let Some(store) = store.upgrade() else {
                break;
            };
            store.purge_expired();
            debug!("Rate limiter holds {} live windows", store.len());
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_background_purge_shrinks_map() {
        let store = Arc::new(InMemoryRateLimiter::new());
        store.check("webhook:bnb:10.0.0.1", 5, 1).await.unwrap();
        store.check("webhook:bnb:10.0.0.2", 5, 1).await.unwrap();
        assert_eq!(store.len(), 2);

        spawn_purge(Arc::downgrade(&store), Duration::from_millis(100));
        tokio::time::sleep(Duration::from_millis(1300)).await;
        assert!(store.is_empty());
    }
}

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Client;
use uuid::Uuid;

use super::{RateLimitDecision, RateLimitStore};

const KEY_PREFIX: &str = "ratelimit";

/// Sliding-window counter shared by every instance through Redis.
///
/// Each attempt is a member of a sorted set scored by its timestamp in
/// milliseconds; members older than the window are trimmed on every check.
#[derive(Clone)]
pub struct RedisRateLimiter {
    manager: ConnectionManager,
}

impl RedisRateLimiter {
    pub async fn connect(url: &str) -> Result<Self, anyhow::Error> {
        tracing::info!("Connecting rate limiter to Redis");
        let client = Client::open(url)?;

        let manager = client.get_connection_manager().await.map_err(|e| {
            tracing::error!("Failed to get Redis connection manager: {}", e);
            anyhow::anyhow!("Failed to connect to Redis: {}", e)
        })?;

        Ok(Self { manager })
    }
}

fn now_millis() -> Result<i64, anyhow::Error> {
    let elapsed = SystemTime::now().duration_since(UNIX_EPOCH)?;
    Ok(elapsed.as_millis() as i64)
}

/// Seconds until the oldest attempt leaves the window.
fn retry_after(oldest_ms: Option<i64>, now_ms: i64, window_ms: i64) -> u64 {
    let wait_ms = match oldest_ms {
        Some(oldest) => (oldest + window_ms - now_ms).max(0),
        None => window_ms,
    };
    ((wait_ms + 999) / 1000).max(1) as u64
}

#[async_trait]
impl RateLimitStore for RedisRateLimiter {
    async fn check(
        &self,
        key: &str,
        max_attempts: u32,
        window_seconds: u64,
    ) -> Result<RateLimitDecision, anyhow::Error> {
        let mut conn = self.manager.clone();
        let redis_key = format!("{}:{}", KEY_PREFIX, key);
        let now = now_millis()?;
        let window_ms = (window_seconds as i64) * 1000;
        let member = format!("{}-{}", now, Uuid::new_v4());

        let (count,): (u64,) = redis::pipe()
            .atomic()
            .cmd("ZREMRANGEBYSCORE")
            .arg(&redis_key)
            .arg(0)
            .arg(now - window_ms)
            .ignore()
            .cmd("ZADD")
            .arg(&redis_key)
            .arg(now)
            .arg(&member)
            .ignore()
            .cmd("ZCARD")
            .arg(&redis_key)
            .cmd("PEXPIRE")
            .arg(&redis_key)
            .arg(window_ms)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Rate limit check failed: {}", e))?;

        if count <= u64::from(max_attempts) {
            return Ok(RateLimitDecision {
                allowed: true,
                remaining: max_attempts - count as u32,
                retry_after_seconds: 0,
            });
        }

        // Rejected attempts do not occupy the window.
        let oldest: Vec<(String, i64)> = redis::pipe()
            .cmd("ZREM")
            .arg(&redis_key)
            .arg(&member)
            .ignore()
            .cmd("ZRANGE")
            .arg(&redis_key)
            .arg(0)
            .arg(0)
            .arg("WITHSCORES")
            .query_async::<_, (Vec<(String, i64)>,)>(&mut conn)
            .await
            .map(|(rows,)| rows)
            .map_err(|e| anyhow::anyhow!("Rate limit check failed: {}", e))?;

        Ok(RateLimitDecision {
            allowed: false,
            remaining: 0,
            retry_after_seconds: retry_after(
                oldest.first().map(|(_, score)| *score),
                now,
                window_ms,
            ),
        })
    }
}

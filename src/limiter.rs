//! Fixed-window rate limiting over a `RawCache`.
//!
//! Each key gets one counter per time window, named `{key}:{window_index}`.
//! The first hit in a window sets a TTL slightly longer than the window so
//! stale buckets expire on their own.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::RawCache;
use crate::error::{CacheError, Result};

/// Extra lifetime given to a bucket beyond its window.
pub const BUCKET_GRACE: Duration = Duration::from_secs(1);

/// Outcome of one [`FixedWindowLimiter::check`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Hits counted in the current window, including this one.
    pub count: i64,
    pub remaining: u64,
    /// Time until the current window ends.
    pub reset_after: Duration,
}

// == Fixed Window Limiter ==
/// Allows at most `limit` hits per key per `window`.
///
/// Relies on atomic increments and per-key TTL, so construction fails
/// against a backend that cannot expire keys individually.
pub struct FixedWindowLimiter {
    cache: Arc<dyn RawCache>,
    limit: u64,
    window: Duration,
}

impl FixedWindowLimiter {
    pub fn new(cache: Arc<dyn RawCache>, limit: u64, window: Duration) -> Result<Self> {
        if !cache.supports_per_key_ttl() {
            return Err(CacheError::UnsupportedCapability("per-key TTL"));
        }
        if window.as_millis() == 0 {
            return Err(CacheError::Config(
                "rate limit window must be at least 1ms".to_string(),
            ));
        }
        Ok(Self {
            cache,
            limit,
            window,
        })
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Counts a hit for `key` in the current window.
    pub async fn check(&self, key: &str) -> Result<RateLimitDecision> {
        self.check_at(key, Utc::now()).await
    }

    /// Counts a hit for `key` in the window containing `now`.
    pub async fn check_at(&self, key: &str, now: DateTime<Utc>) -> Result<RateLimitDecision> {
        let (index, reset_after) = self.window_position(now);
        let bucket = format!("{}:{}", key, index);

        let count = self.cache.increment(&bucket, 1).await?;
        if count == 1 {
            self.cache
                .expire(&bucket, self.window.saturating_add(BUCKET_GRACE))
                .await?;
        }

        let used = u64::try_from(count).unwrap_or(0);
        let allowed = used <= self.limit;
        if !allowed {
            debug!(key, count, limit = self.limit, "Rate limit exceeded");
        }

        Ok(RateLimitDecision {
            allowed,
            count,
            remaining: self.limit.saturating_sub(used),
            reset_after,
        })
    }

    /// Window index for `now` and the time left in that window.
    fn window_position(&self, now: DateTime<Utc>) -> (i64, Duration) {
        let window_ms = i64::try_from(self.window.as_millis()).unwrap_or(i64::MAX);
        let now_ms = now.timestamp_millis();
        if now_ms < 0 {
            warn!("Clock is before the unix epoch");
        }
        let index = now_ms.div_euclid(window_ms);
        let elapsed = now_ms.rem_euclid(window_ms);
        let left = u64::try_from(window_ms - elapsed).unwrap_or(0);
        (index, Duration::from_millis(left))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{MemoryCache, MemoryConfig};
    use chrono::TimeZone;

    fn memory() -> Arc<MemoryCache> {
        Arc::new(MemoryCache::new(MemoryConfig::default()))
    }

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    #[tokio::test]
    async fn test_allows_up_to_limit() {
        let limiter = FixedWindowLimiter::new(memory(), 3, Duration::from_secs(60)).unwrap();
        let now = at(120_000);

        for expected in 1..=3 {
            let decision = limiter.check_at("client", now).await.unwrap();
            assert!(decision.allowed);
            assert_eq!(decision.count, expected);
            assert_eq!(decision.remaining, 3 - expected as u64);
        }

        let denied = limiter.check_at("client", now).await.unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.count, 4);
        assert_eq!(denied.remaining, 0);
    }

    #[tokio::test]
    async fn test_new_window_resets_count() {
        let limiter = FixedWindowLimiter::new(memory(), 1, Duration::from_secs(60)).unwrap();

        assert!(limiter.check_at("c", at(60_000)).await.unwrap().allowed);
        assert!(!limiter.check_at("c", at(119_999)).await.unwrap().allowed);
        assert!(limiter.check_at("c", at(120_000)).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let limiter = FixedWindowLimiter::new(memory(), 1, Duration::from_secs(60)).unwrap();
        let now = at(0);

        assert!(limiter.check_at("a", now).await.unwrap().allowed);
        assert!(limiter.check_at("b", now).await.unwrap().allowed);
        assert!(!limiter.check_at("a", now).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_first_hit_sets_bucket_ttl() {
        let cache = memory();
        let limiter = FixedWindowLimiter::new(cache.clone(), 5, Duration::from_secs(10)).unwrap();

        limiter.check_at("ip", at(25_000)).await.unwrap();

        let ttl = cache.ttl("ip:2").flatten().unwrap();
        assert!(ttl > Duration::from_secs(10));
        assert!(ttl <= Duration::from_secs(11));
    }

    #[tokio::test]
    async fn test_reset_after() {
        let limiter = FixedWindowLimiter::new(memory(), 5, Duration::from_secs(10)).unwrap();

        let decision = limiter.check_at("ip", at(25_000)).await.unwrap();

        assert_eq!(decision.reset_after, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_zero_window_rejected() {
        let result = FixedWindowLimiter::new(memory(), 5, Duration::ZERO);
        assert!(matches!(result, Err(CacheError::Config(_))));
    }

    #[tokio::test]
    async fn test_check_uses_wall_clock() {
        let limiter = FixedWindowLimiter::new(memory(), 10, Duration::from_secs(3600)).unwrap();

        let decision = limiter.check("user").await.unwrap();

        assert!(decision.allowed);
        assert_eq!(decision.count, 1);
        assert!(decision.reset_after <= Duration::from_secs(3600));
    }
}

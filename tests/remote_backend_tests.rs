//! Integration Tests for remote backends
//!
//! Tests against live servers run only when their DSN is exported:
//! - `KVCACHE_TEST_REDIS_DSN` (e.g. `redis://127.0.0.1:6379`)
//! - `KVCACHE_TEST_NATS_DSN` (e.g. `nats://127.0.0.1:4222`, JetStream enabled)
//!
//! The fail-fast tests always run and need no server.

#![cfg(any(feature = "redis", feature = "nats"))]

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use kvcache::{open, BackendKind, CacheError, CacheOptions};

// == Helper Functions ==

fn dsn(var: &str) -> Option<String> {
    match std::env::var(var) {
        Ok(dsn) if !dsn.trim().is_empty() => Some(dsn),
        _ => {
            eprintln!("{} not set, skipping", var);
            None
        }
    }
}

/// Name unique to this run, so parallel runs do not share keys.
fn unique(prefix: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!("{}-{}", prefix, nanos)
}

// == Redis Tests ==

#[cfg(feature = "redis")]
mod redis_backend {
    use super::*;
    use kvcache::FixedWindowLimiter;

    fn options(dsn: &str, name: &str) -> CacheOptions {
        CacheOptions::new(BackendKind::Redis)
            .with_dsn(dsn)
            .with_name(name)
            .with_timeout(Duration::from_secs(2))
    }

    #[tokio::test]
    async fn test_unreachable_server_fails_fast() {
        let options = CacheOptions::new(BackendKind::Redis)
            .with_dsn("redis://127.0.0.1:1")
            .with_timeout(Duration::from_secs(2));

        let result = open(&options).await;

        assert!(matches!(result, Err(CacheError::Connection(_))));
    }

    #[tokio::test]
    async fn test_redis_contract() {
        let Some(dsn) = dsn("KVCACHE_TEST_REDIS_DSN") else {
            return;
        };
        let cache = open(&options(&dsn, &unique("contract"))).await.unwrap();

        cache.set("k", b"v".to_vec(), None).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(b"v".to_vec()));
        assert!(cache.exists("k").await.unwrap());

        cache.delete("k").await.unwrap();
        cache.delete("k").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);

        assert_eq!(cache.increment("n", 5).await.unwrap(), 5);
        assert_eq!(cache.decrement("n", 7).await.unwrap(), -2);

        cache
            .set("short", b"v".to_vec(), Some(Duration::from_millis(200)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(!cache.exists("short").await.unwrap());

        assert!(cache.supports_per_key_ttl());
        cache.flush().await.unwrap();
        cache.close().await.unwrap();
        assert!(matches!(cache.get("n").await, Err(CacheError::Closed)));
    }

    #[tokio::test]
    async fn test_redis_flush_is_namespaced() {
        let Some(dsn) = dsn("KVCACHE_TEST_REDIS_DSN") else {
            return;
        };
        let a = open(&options(&dsn, &unique("ns-a"))).await.unwrap();
        let b = open(&options(&dsn, &unique("ns-b"))).await.unwrap();

        a.set("k", b"a".to_vec(), None).await.unwrap();
        b.set("k", b"b".to_vec(), None).await.unwrap();
        a.flush().await.unwrap();

        assert_eq!(a.get("k").await.unwrap(), None);
        assert_eq!(b.get("k").await.unwrap(), Some(b"b".to_vec()));
        b.flush().await.unwrap();
    }

    #[tokio::test]
    async fn test_redis_concurrent_increments() {
        let Some(dsn) = dsn("KVCACHE_TEST_REDIS_DSN") else {
            return;
        };
        let cache = open(&options(&dsn, &unique("counter"))).await.unwrap();

        let tasks: Vec<_> = (0..20)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move {
                    for _ in 0..25 {
                        cache.increment("hits", 1).await.unwrap();
                    }
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(cache.increment("hits", 0).await.unwrap(), 500);
        cache.flush().await.unwrap();
    }

    #[tokio::test]
    async fn test_redis_limiter() {
        let Some(dsn) = dsn("KVCACHE_TEST_REDIS_DSN") else {
            return;
        };
        let cache = open(&options(&dsn, &unique("limits"))).await.unwrap();
        let limiter = FixedWindowLimiter::new(cache.clone(), 1, Duration::from_secs(3600)).unwrap();

        assert!(limiter.check("client").await.unwrap().allowed);
        assert!(!limiter.check("client").await.unwrap().allowed);
        cache.flush().await.unwrap();
    }
}

// == NATS KV Tests ==

#[cfg(feature = "nats")]
mod nats_backend {
    use super::*;
    use kvcache::FixedWindowLimiter;

    fn options(dsn: &str, bucket: &str) -> CacheOptions {
        CacheOptions::new(BackendKind::NatsKv)
            .with_dsn(dsn)
            .with_name(bucket)
            .with_timeout(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_unreachable_server_fails_fast() {
        let options = CacheOptions::new(BackendKind::NatsKv)
            .with_dsn("nats://127.0.0.1:1")
            .with_timeout(Duration::from_secs(2));

        let result = open(&options).await;

        assert!(matches!(result, Err(CacheError::Connection(_))));
    }

    #[tokio::test]
    async fn test_nats_contract() {
        let Some(dsn) = dsn("KVCACHE_TEST_NATS_DSN") else {
            return;
        };
        let cache = open(&options(&dsn, &unique("contract"))).await.unwrap();

        cache.set("k", b"v".to_vec(), None).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(b"v".to_vec()));
        assert!(cache.exists("k").await.unwrap());

        cache.delete("k").await.unwrap();
        cache.delete("k").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);

        assert_eq!(cache.increment("n", 3).await.unwrap(), 3);
        assert_eq!(cache.decrement("n", 5).await.unwrap(), -2);

        cache.flush().await.unwrap();
        assert_eq!(cache.get("n").await.unwrap(), None);
        cache.close().await.unwrap();
        cache.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_nats_ignores_per_key_ttl() {
        let Some(dsn) = dsn("KVCACHE_TEST_NATS_DSN") else {
            return;
        };
        let cache = open(&options(&dsn, &unique("ttl"))).await.unwrap();

        assert!(!cache.supports_per_key_ttl());
        cache
            .set("k", b"v".to_vec(), Some(Duration::from_millis(50)))
            .await
            .unwrap();
        cache.expire("k", Duration::from_millis(50)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(cache.get("k").await.unwrap(), Some(b"v".to_vec()));
        assert!(matches!(
            FixedWindowLimiter::new(cache.clone(), 1, Duration::from_secs(1)),
            Err(CacheError::UnsupportedCapability(_))
        ));
        cache.flush().await.unwrap();
    }

    #[tokio::test]
    async fn test_nats_concurrent_increments() {
        let Some(dsn) = dsn("KVCACHE_TEST_NATS_DSN") else {
            return;
        };
        let cache = open(&options(&dsn, &unique("counter"))).await.unwrap();

        let tasks: Vec<_> = (0..10)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move {
                    for _ in 0..10 {
                        cache.increment("hits", 1).await.unwrap();
                    }
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(cache.increment("hits", 0).await.unwrap(), 100);
        cache.flush().await.unwrap();
    }
}

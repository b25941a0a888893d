//! Cache backend construction.
//!
//! Picks a `RawCache` implementation from [`CacheOptions`].
//!
//! # Available Backends
//! - **Memory** - bounded in-process cache, always available
//! - **Redis** - any Redis-protocol server (feature: `redis`)
//! - **NATS KV** - JetStream key-value bucket (feature: `nats`)

#[cfg(feature = "nats")]
pub mod nats_kv;
#[cfg(feature = "redis")]
pub mod redis_cache;

use std::sync::Arc;

use tracing::info;

use crate::cache::{MemoryCache, MemoryConfig, RawCache};
use crate::config::{BackendKind, CacheOptions};
use crate::error::{CacheError, Result};

#[cfg(feature = "nats")]
pub use nats_kv::NatsKvCache;
#[cfg(feature = "redis")]
pub use redis_cache::RedisCache;

/// Builds the backend selected by `options.backend`.
///
/// Remote backends connect and probe the server before returning, so an
/// unreachable server fails here rather than on first use.
pub async fn open(options: &CacheOptions) -> Result<Arc<dyn RawCache>> {
    let cache: Arc<dyn RawCache> = match options.backend {
        BackendKind::Memory => Arc::new(MemoryCache::new(MemoryConfig::from(options))),
        #[cfg(feature = "redis")]
        BackendKind::Redis => Arc::new(RedisCache::connect(options).await?),
        #[cfg(feature = "nats")]
        BackendKind::NatsKv => Arc::new(NatsKvCache::connect(options).await?),
        #[allow(unreachable_patterns)]
        other => {
            return Err(CacheError::Config(format!(
                "backend '{}' is not compiled into this build",
                other
            )))
        }
    };
    info!(backend = %options.backend, "Cache backend ready");
    Ok(cache)
}

/// Runs `operation`, giving up after `limit` when one is set.
#[cfg(any(feature = "redis", feature = "nats"))]
pub(crate) async fn with_deadline<T, F>(limit: Option<std::time::Duration>, operation: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, operation)
            .await
            .map_err(|_| CacheError::Timeout(limit))?,
        None => operation.await,
    }
}

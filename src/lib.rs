//! kvcache - A backend-agnostic key/value cache
//!
//! One byte-level contract ([`RawCache`]) over an in-memory store, Redis and
//! NATS JetStream key-value buckets, with typed wrappers, pluggable value
//! serializers and a named registry that owns backend lifetimes.

pub mod backends;
pub mod cache;
pub mod config;
pub mod error;
pub mod limiter;
pub mod manager;
pub mod serializer;
pub mod tasks;
pub mod typed;

pub use backends::open;
pub use cache::{CacheStats, MemoryCache, MemoryConfig, RawCache};
pub use config::{BackendKind, CacheOptions};
pub use error::{CacheError, CloseErrors, Result};
pub use limiter::{FixedWindowLimiter, RateLimitDecision};
pub use manager::CacheManager;
pub use serializer::{BincodeSerializer, JsonSerializer, Serializer};
pub use typed::Cache;

#[cfg(feature = "nats")]
pub use backends::NatsKvCache;
#[cfg(feature = "redis")]
pub use backends::RedisCache;

//! Cache Module
//!
//! The byte-level `RawCache` contract and its in-memory implementation.

mod entry;
mod memory;
mod stats;
mod store;


use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

// Re-export public types
pub use entry::{decode_counter, encode_counter, CacheEntry, COUNTER_WIDTH};
pub use memory::{MemoryCache, MemoryConfig};
pub use stats::{CacheStats, StatsRecorder};
pub use store::MemoryStore;

// == Raw Cache ==
/// Byte-level contract implemented by every cache backend.
///
/// Reads treat a missing or expired key as `Ok(None)` / `Ok(false)`, never
/// as an error. Implementations are shared across tasks without any
/// caller-side locking.
#[async_trait]
pub trait RawCache: Send + Sync {
    /// Returns the stored bytes if the key is present and unexpired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Stores `value`, replacing any existing entry and its TTL.
    ///
    /// `None` or a zero TTL means "backend default"; each backend documents
    /// what that default is.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()>;

    /// Removes the key. Deleting an absent key succeeds.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Same expiration semantics as `get`, without the payload.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Removes every key belonging to this cache instance.
    async fn flush(&self) -> Result<()>;

    /// Releases connections and background tasks. Repeated calls are no-ops.
    async fn close(&self) -> Result<()>;

    /// Atomically adds `delta` to a counter, treating absent keys as zero.
    async fn increment(&self, key: &str, delta: i64) -> Result<i64>;

    /// Atomically subtracts `delta` from a counter.
    async fn decrement(&self, key: &str, delta: i64) -> Result<i64> {
        self.increment(key, delta.saturating_neg()).await
    }

    /// Replaces the TTL of an existing key without changing its value.
    ///
    /// Absent keys are left untouched. Backends whose
    /// [`supports_per_key_ttl`](RawCache::supports_per_key_ttl) is false
    /// treat this as a no-op.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<()>;

    /// Whether `expire` really changes the TTL of a single key.
    fn supports_per_key_ttl(&self) -> bool;
}

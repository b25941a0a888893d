//! In-memory backend
//!
//! Wraps a [`MemoryStore`] in the `RawCache` contract and owns its background
//! expiry sweep.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::cache::{CacheStats, MemoryStore, RawCache};
use crate::config::{CacheOptions, DEFAULT_MAX_ENTRIES, DEFAULT_SWEEP_INTERVAL};
use crate::error::Result;
use crate::tasks::spawn_sweep_task;

// == Memory Config ==
/// Settings for the in-memory backend.
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Maximum number of live entries
    pub max_entries: usize,
    /// TTL for writes that carry none, None = never expire
    pub default_ttl: Option<Duration>,
    /// Interval between background expiry sweeps
    pub sweep_interval: Duration,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            default_ttl: None,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

impl From<&CacheOptions> for MemoryConfig {
    fn from(options: &CacheOptions) -> Self {
        Self {
            max_entries: options.max_entries,
            default_ttl: options.max_age,
            sweep_interval: options.sweep_interval,
        }
    }
}

// == Memory Cache ==
/// Self-contained `RawCache` with bounded size and no external process.
///
/// Never fails on I/O; every operation returns `Ok`. The cache stays usable
/// after `close`, only the background sweep stops.
#[derive(Debug)]
pub struct MemoryCache {
    store: Arc<MemoryStore>,
    shutdown: watch::Sender<bool>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl MemoryCache {
    /// Creates the cache and starts its sweep on the current tokio runtime.
    ///
    /// Outside a runtime the sweep is skipped; expired entries are still
    /// hidden and removed lazily on read.
    pub fn new(config: MemoryConfig) -> Self {
        let store = Arc::new(MemoryStore::new(config.max_entries, config.default_ttl));
        let (shutdown, signal) = watch::channel(false);

        let sweeper = match Handle::try_current() {
            Ok(_) => Some(spawn_sweep_task(
                Arc::downgrade(&store),
                config.sweep_interval,
                signal,
            )),
            Err(_) => {
                warn!("No tokio runtime available, background expiry sweep disabled");
                None
            }
        };

        Self {
            store,
            shutdown,
            sweeper: Mutex::new(sweeper),
            closed: AtomicBool::new(false),
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.store.stats()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Remaining TTL of a live key; see [`MemoryStore::ttl`].
    pub fn ttl(&self, key: &str) -> Option<Option<Duration>> {
        self.store.ttl(key)
    }

    /// Signals the sweep exactly once and hands back its handle.
    fn stop_sweeper(&self) -> Option<JoinHandle<()>> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return None;
        }
        self.shutdown.send_replace(true);
        self.sweeper.lock().take()
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(MemoryConfig::default())
    }
}

impl Drop for MemoryCache {
    fn drop(&mut self) {
        self.stop_sweeper();
    }
}

#[async_trait]
impl RawCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.store.get(key))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        self.store.set(key, value, ttl);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.store.delete(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.store.exists(key))
    }

    async fn flush(&self) -> Result<()> {
        self.store.flush();
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if let Some(handle) = self.stop_sweeper() {
            if let Err(err) = handle.await {
                warn!("Expiry sweep task ended abnormally: {}", err);
            }
            info!("In-memory cache closed");
        }
        Ok(())
    }

    async fn increment(&self, key: &str, delta: i64) -> Result<i64> {
        Ok(self.store.increment(key, delta))
    }

    async fn decrement(&self, key: &str, delta: i64) -> Result<i64> {
        Ok(self.store.decrement(key, delta))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        self.store.expire(key, ttl);
        Ok(())
    }

    fn supports_per_key_ttl(&self) -> bool {
        true
    }
}

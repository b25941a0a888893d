//! Cache Manager
//!
//! Named registry of `RawCache` backends with coordinated shutdown.

use std::collections::HashMap;
use std::fmt::{self, Display};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, warn};

use crate::cache::RawCache;
use crate::error::{CloseErrors, Result};
use crate::typed::Cache;

// == Cache Manager ==
/// Owns the backends of one application scope, keyed by logical name.
///
/// Construct one per service and pass it by reference (or `Arc`) to the
/// components that need caches. Lookups hand out shared references; the
/// manager stays the owner responsible for closing each backend.
#[derive(Default)]
pub struct CacheManager {
    caches: RwLock<HashMap<String, Arc<dyn RawCache>>>,
}

impl CacheManager {
    pub fn new() -> Self {
        Self::default()
    }

    // == Add ==
    /// Registers `cache` under `name`.
    ///
    /// A previous backend under the same name is replaced and returned
    /// without being closed; closing it is the caller's job.
    pub fn add_cache(
        &self,
        name: impl Into<String>,
        cache: Arc<dyn RawCache>,
    ) -> Option<Arc<dyn RawCache>> {
        let name = name.into();
        let previous = self.caches.write().insert(name.clone(), cache);
        if previous.is_some() {
            warn!(cache = %name, "Replaced registered cache; previous backend left open");
        } else {
            info!(cache = %name, "Registered cache");
        }
        previous
    }

    // == Lookup ==
    pub fn get_raw_cache(&self, name: &str) -> Option<Arc<dyn RawCache>> {
        self.caches.read().get(name).cloned()
    }

    /// Looks up `name` and wraps it in a typed cache with `Display` keys.
    pub fn get_cache<K, V>(&self, name: &str) -> Option<Cache<K, V>>
    where
        K: Display + 'static,
        V: Serialize + DeserializeOwned + 'static,
    {
        self.get_raw_cache(name).map(Cache::new)
    }

    /// Looks up `name` and wraps it in a typed cache with a custom key function.
    pub fn get_cache_with<K, V, F>(&self, name: &str, key_fn: F) -> Option<Cache<K, V>>
    where
        K: 'static,
        V: Serialize + DeserializeOwned + 'static,
        F: Fn(&K) -> String + Send + Sync + 'static,
    {
        self.get_raw_cache(name)
            .map(|raw| Cache::with_key_fn(raw, key_fn))
    }

    // == Remove ==
    /// Detaches `name` and closes its backend.
    ///
    /// Removing an unknown name is a no-op.
    pub async fn remove_cache(&self, name: &str) -> Result<()> {
        let removed = self.caches.write().remove(name);
        let Some(cache) = removed else {
            return Ok(());
        };
        info!(cache = %name, "Removing cache");
        cache.close().await
    }

    pub fn names(&self) -> Vec<String> {
        self.caches.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.caches.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.caches.read().is_empty()
    }

    // == Close ==
    /// Closes every registered backend and empties the registry.
    ///
    /// Every backend gets a close attempt; all failures are reported
    /// together in a single [`CloseErrors`].
    pub async fn close(&self) -> Result<()> {
        let drained: Vec<(String, Arc<dyn RawCache>)> = self.caches.write().drain().collect();
        let mut errors = CloseErrors::new();

        for (name, cache) in drained {
            if let Err(err) = cache.close().await {
                warn!(cache = %name, "Failed to close cache: {}", err);
                errors.push(name, err);
            }
        }

        info!(failures = errors.len(), "Cache manager closed");
        errors.into_result()
    }
}

impl fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheManager")
            .field("caches", &self.names())
            .finish()
    }
}

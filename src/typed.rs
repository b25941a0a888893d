//! Typed cache wrapper.
//!
//! [`Cache`] layers key formatting and value serialization over any
//! [`RawCache`], so callers work with their own key and value types.

use std::fmt::{self, Display};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cache::RawCache;
use crate::error::Result;
use crate::serializer::{JsonSerializer, Serializer};

/// Turns a typed key into the string stored in the backend.
pub type KeyFn<K> = Arc<dyn Fn(&K) -> String + Send + Sync>;

// == Typed Cache ==
/// Type-safe view over a shared `RawCache`.
///
/// The wrapper does not own the backend beyond forwarding `close`; when the
/// backend is registered in a `CacheManager`, the manager owns it. The key
/// function must be collision-free for the caller's key domain.
pub struct Cache<K, V> {
    raw: Arc<dyn RawCache>,
    serializer: Arc<dyn Serializer<V>>,
    key_fn: KeyFn<K>,
    _key: PhantomData<fn(&K)>,
}

impl<K, V> Cache<K, V>
where
    K: 'static,
    V: Serialize + DeserializeOwned + 'static,
{
    /// Wraps `raw`, formatting keys with `Display` and storing JSON.
    pub fn new(raw: Arc<dyn RawCache>) -> Self
    where
        K: Display,
    {
        Self::with_key_fn(raw, |key: &K| key.to_string())
    }

    /// Wraps `raw` with a custom key function, storing JSON.
    pub fn with_key_fn<F>(raw: Arc<dyn RawCache>, key_fn: F) -> Self
    where
        F: Fn(&K) -> String + Send + Sync + 'static,
    {
        Self {
            raw,
            serializer: Arc::new(JsonSerializer),
            key_fn: Arc::new(key_fn),
            _key: PhantomData,
        }
    }
}

impl<K, V> Cache<K, V> {
    /// Replaces the serializer used by this wrapper only.
    pub fn with_serializer<S>(mut self, serializer: S) -> Self
    where
        S: Serializer<V> + 'static,
    {
        self.serializer = Arc::new(serializer);
        self
    }

    /// The backend this wrapper delegates to.
    pub fn raw(&self) -> &Arc<dyn RawCache> {
        &self.raw
    }

    /// Formats a key the way this wrapper stores it.
    pub fn format_key(&self, key: &K) -> String {
        (self.key_fn)(key)
    }

    /// Returns the decoded value, or `None` on a miss.
    ///
    /// Bytes that fail to decode are reported as an error rather than a miss.
    pub async fn get(&self, key: &K) -> Result<Option<V>> {
        match self.raw.get(&self.format_key(key)).await? {
            Some(bytes) => self.serializer.unmarshal(&bytes).map(Some),
            None => Ok(None),
        }
    }

    pub async fn set(&self, key: &K, value: &V, ttl: Option<Duration>) -> Result<()> {
        let bytes = self.serializer.marshal(value)?;
        self.raw.set(&self.format_key(key), bytes, ttl).await
    }

    pub async fn delete(&self, key: &K) -> Result<()> {
        self.raw.delete(&self.format_key(key)).await
    }

    pub async fn exists(&self, key: &K) -> Result<bool> {
        self.raw.exists(&self.format_key(key)).await
    }

    pub async fn flush(&self) -> Result<()> {
        self.raw.flush().await
    }

    pub async fn close(&self) -> Result<()> {
        self.raw.close().await
    }
}

impl<K, V> Clone for Cache<K, V> {
    fn clone(&self) -> Self {
        Self {
            raw: Arc::clone(&self.raw),
            serializer: Arc::clone(&self.serializer),
            key_fn: Arc::clone(&self.key_fn),
            _key: PhantomData,
        }
    }
}

impl<K, V> fmt::Debug for Cache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("per_key_ttl", &self.raw.supports_per_key_ttl())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{MemoryCache, MemoryConfig};
    use crate::error::CacheError;
    use crate::serializer::BincodeSerializer;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct User {
        id: u32,
        name: String,
    }

    fn alice() -> User {
        User {
            id: 1,
            name: "Alice".to_string(),
        }
    }

    fn raw() -> Arc<dyn RawCache> {
        Arc::new(MemoryCache::new(MemoryConfig::default()))
    }

    #[tokio::test]
    async fn test_typed_round_trip() {
        let users: Cache<String, User> = Cache::new(raw());

        users
            .set(&"1".to_string(), &alice(), Some(Duration::from_secs(60)))
            .await
            .unwrap();

        assert_eq!(users.get(&"1".to_string()).await.unwrap(), Some(alice()));
        assert!(users.exists(&"1".to_string()).await.unwrap());
    }

    #[tokio::test]
    async fn test_typed_miss_is_none() {
        let users: Cache<String, User> = Cache::new(raw());
        assert_eq!(users.get(&"ghost".to_string()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_custom_key_fn_reaches_backend() {
        let backend = raw();
        let users: Cache<u32, User> =
            Cache::with_key_fn(Arc::clone(&backend), |id: &u32| format!("user:{}", id));

        users.set(&1, &alice(), None).await.unwrap();

        assert!(backend.exists("user:1").await.unwrap());
        assert_eq!(users.format_key(&42), "user:42");
    }

    #[tokio::test]
    async fn test_decode_failure_is_an_error() {
        let backend = raw();
        backend.set("1", b"not json".to_vec(), None).await.unwrap();
        let users: Cache<String, User> = Cache::new(backend);

        let result = users.get(&"1".to_string()).await;

        assert!(matches!(result, Err(CacheError::Json(_))));
    }

    #[tokio::test]
    async fn test_serializers_are_per_wrapper() {
        let backend = raw();
        let json: Cache<String, User> = Cache::new(Arc::clone(&backend));
        let binary: Cache<String, User> =
            Cache::with_key_fn(Arc::clone(&backend), |k: &String| format!("bin:{}", k))
                .with_serializer(BincodeSerializer);

        json.set(&"1".to_string(), &alice(), None).await.unwrap();
        binary.set(&"1".to_string(), &alice(), None).await.unwrap();

        let stored_json = backend.get("1").await.unwrap().unwrap();
        let stored_bin = backend.get("bin:1").await.unwrap().unwrap();
        assert!(stored_json.starts_with(b"{"));
        assert_ne!(stored_json, stored_bin);
        assert_eq!(binary.get(&"1".to_string()).await.unwrap(), Some(alice()));
    }

    #[tokio::test]
    async fn test_delete_and_flush_pass_through() {
        let users: Cache<String, User> = Cache::new(raw());

        users.set(&"1".to_string(), &alice(), None).await.unwrap();
        users.set(&"2".to_string(), &alice(), None).await.unwrap();
        users.delete(&"1".to_string()).await.unwrap();
        users.delete(&"1".to_string()).await.unwrap();

        assert!(!users.exists(&"1".to_string()).await.unwrap());
        users.flush().await.unwrap();
        assert!(!users.exists(&"2".to_string()).await.unwrap());
    }
}

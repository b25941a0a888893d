//! Durable key-value backend on a NATS JetStream bucket.
//!
//! A bucket is a versioned, append-only stream, so TTL is a property of the
//! bucket (`max_age`) rather than of individual keys. Counters are updated
//! optimistically against the entry revision and retried on conflict.

use std::fmt::Display;
use std::time::Duration;

use async_nats::jetstream::{
    self,
    kv::{self, CreateErrorKind, Operation, UpdateErrorKind},
};
use async_nats::ConnectOptions;
use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::backends::with_deadline;
use crate::cache::{decode_counter, encode_counter, RawCache};
use crate::config::CacheOptions;
use crate::error::{CacheError, Result};

/// Bucket used when no name is configured.
pub const DEFAULT_BUCKET: &str = "kvcache";

fn backend(err: impl Display) -> CacheError {
    CacheError::Backend(err.to_string())
}

// == NATS KV Cache ==
/// `RawCache` over a JetStream key-value bucket.
///
/// Entries expire after the bucket's `max_age` (from `with_max_age`; never
/// when unset). Per-call TTLs are ignored, `expire` is a no-op and
/// [`supports_per_key_ttl`](RawCache::supports_per_key_ttl) is `false`.
/// Counters are not floored at zero.
pub struct NatsKvCache {
    client: async_nats::Client,
    store: RwLock<Option<kv::Store>>,
    bucket: String,
    timeout: Option<Duration>,
}

impl NatsKvCache {
    /// Connects, flushes a round trip to the server, then opens or creates
    /// the bucket.
    pub async fn connect(options: &CacheOptions) -> Result<Self> {
        let dsn = options
            .dsn
            .as_deref()
            .ok_or_else(|| CacheError::Config("nats backend requires a DSN".to_string()))?;
        let bucket = options
            .name
            .clone()
            .unwrap_or_else(|| DEFAULT_BUCKET.to_string());

        let connect_options = match &options.creds_file {
            Some(path) => ConnectOptions::with_credentials_file(path.clone())
                .await
                .map_err(|e| {
                    CacheError::Config(format!("reading credentials {}: {}", path.display(), e))
                })?,
            None => ConnectOptions::new(),
        };

        let client = with_deadline(options.timeout, async {
            let client = connect_options.connect(dsn).await.map_err(backend)?;
            client.flush().await.map_err(backend)?;
            Ok(client)
        })
        .await
        .map_err(|e| CacheError::Connection(format!("nats unreachable: {}", e)))?;

        let store = Self::open_bucket(&client, &bucket, options.max_age).await?;

        info!(bucket = %bucket, "Connected to nats key-value bucket");
        Ok(Self {
            client,
            store: RwLock::new(Some(store)),
            bucket,
            timeout: options.timeout,
        })
    }

    async fn open_bucket(
        client: &async_nats::Client,
        bucket: &str,
        max_age: Option<Duration>,
    ) -> Result<kv::Store> {
        let context = jetstream::new(client.clone());
        if let Ok(store) = context.get_key_value(bucket).await {
            return Ok(store);
        }
        context
            .create_key_value(kv::Config {
                bucket: bucket.to_string(),
                history: 1,
                max_age: max_age.unwrap_or_default(),
                ..Default::default()
            })
            .await
            .map_err(|e| CacheError::Connection(format!("creating bucket {}: {}", bucket, e)))
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn store(&self) -> Result<kv::Store> {
        self.store.read().clone().ok_or(CacheError::Closed)
    }

    async fn get_value(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let value = self.store()?.get(key).await.map_err(backend)?;
        Ok(value.map(|bytes| bytes.to_vec()))
    }

    async fn put_value(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.store()?
            .put(key, Bytes::from(value))
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn delete_value(&self, key: &str) -> Result<()> {
        self.store()?.delete(key).await.map_err(backend)
    }

    async fn purge_all(&self) -> Result<usize> {
        let store = self.store()?;
        let keys: Vec<String> = store
            .keys()
            .await
            .map_err(backend)?
            .try_collect()
            .await
            .map_err(backend)?;
        for key in &keys {
            store.purge(key).await.map_err(backend)?;
        }
        Ok(keys.len())
    }

    /// Read, compute, then write conditioned on the revision that was read.
    /// A revision conflict means another writer won; start over.
    async fn add(&self, key: &str, delta: i64) -> Result<i64> {
        let store = self.store()?;
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            let entry = store.entry(key).await.map_err(backend)?;
            let live = entry
                .as_ref()
                .filter(|entry| matches!(entry.operation, Operation::Put));

            let next = live
                .map_or(0, |entry| decode_counter(&entry.value))
                .saturating_add(delta);
            let payload = Bytes::from(encode_counter(next));

            let written = match live {
                Some(entry) => match store.update(key, payload, entry.revision).await {
                    Ok(_) => true,
                    Err(err) if matches!(err.kind(), UpdateErrorKind::WrongLastRevision) => false,
                    Err(err) => return Err(backend(err)),
                },
                None => match store.create(key, payload).await {
                    Ok(_) => true,
                    Err(err) if matches!(err.kind(), CreateErrorKind::AlreadyExists) => false,
                    Err(err) => return Err(backend(err)),
                },
            };

            if written {
                if attempts > 1 {
                    debug!(key, attempts, "Counter update retried after revision conflict");
                }
                return Ok(next);
            }
        }
    }
}

#[async_trait]
impl RawCache for NatsKvCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        with_deadline(self.timeout, self.get_value(key)).await
    }

    /// `ttl` is ignored; the bucket's max-age governs expiry.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        if ttl.is_some_and(|ttl| !ttl.is_zero()) {
            debug!(key, "Per-key TTL ignored by nats bucket {}", self.bucket);
        }
        with_deadline(self.timeout, self.put_value(key, value)).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        with_deadline(self.timeout, self.delete_value(key)).await
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    async fn flush(&self) -> Result<()> {
        let purged = with_deadline(self.timeout, self.purge_all()).await?;
        info!(bucket = %self.bucket, purged, "Flushed nats bucket");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.store.write().take().is_none() {
            return Ok(());
        }
        self.client.flush().await.map_err(backend)?;
        info!(bucket = %self.bucket, "NATS key-value cache closed");
        Ok(())
    }

    async fn increment(&self, key: &str, delta: i64) -> Result<i64> {
        with_deadline(self.timeout, self.add(key, delta)).await
    }

    /// No-op: a bucket cannot expire one key independently.
    async fn expire(&self, key: &str, _ttl: Duration) -> Result<()> {
        debug!(key, "Expire ignored by nats bucket {}", self.bucket);
        Ok(())
    }

    fn supports_per_key_ttl(&self) -> bool {
        false
    }
}

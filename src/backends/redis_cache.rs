//! Redis-compatible backend.
//!
//! Counters use `INCRBY`/`DECRBY`, TTLs use `PX`/`PEXPIRE`, so both are
//! atomic on the server. Counters are stored as decimal strings, the native
//! Redis representation, and are not floored at zero.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use redis::aio::ConnectionManager;
use redis::{Cmd, FromRedisValue};
use tracing::{info, warn};

use crate::backends::with_deadline;
use crate::cache::RawCache;
use crate::config::CacheOptions;
use crate::error::{CacheError, Result};

/// Keys fetched per `SCAN` round trip during a namespaced flush.
const SCAN_BATCH: usize = 500;

// == Redis Cache ==
/// `RawCache` over a Redis connection manager.
///
/// With a namespace (`with_name`) every key is stored as `{name}:{key}` and
/// `flush` only deletes that prefix. Without one, `flush` runs `FLUSHDB`,
/// which wipes the whole logical database shared with any other client.
pub struct RedisCache {
    conn: RwLock<Option<ConnectionManager>>,
    prefix: Option<String>,
    default_ttl: Option<Duration>,
    timeout: Option<Duration>,
}

impl RedisCache {
    /// Connects and pings the server.
    pub async fn connect(options: &CacheOptions) -> Result<Self> {
        let dsn = options
            .dsn
            .as_deref()
            .ok_or_else(|| CacheError::Config("redis backend requires a DSN".to_string()))?;
        let client = redis::Client::open(dsn)
            .map_err(|e| CacheError::Config(format!("invalid redis DSN: {}", e)))?;

        let conn = with_deadline(options.timeout, Self::handshake(client))
            .await
            .map_err(|e| CacheError::Connection(format!("redis unreachable: {}", e)))?;

        info!(namespace = ?options.name, "Connected to redis");
        Ok(Self {
            conn: RwLock::new(Some(conn)),
            prefix: options.name.as_ref().map(|name| format!("{}:", name)),
            default_ttl: options.max_age,
            timeout: options.timeout,
        })
    }

    async fn handshake(client: redis::Client) -> Result<ConnectionManager> {
        let mut conn = ConnectionManager::new(client).await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(conn)
    }

    fn connection(&self) -> Result<ConnectionManager> {
        self.conn.read().clone().ok_or(CacheError::Closed)
    }

    fn key(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}{}", prefix, key),
            None => key.to_string(),
        }
    }

    async fn query<T: FromRedisValue>(&self, cmd: Cmd) -> Result<T> {
        let mut conn = self.connection()?;
        let reply = cmd.query_async(&mut conn);
        with_deadline(self.timeout, async move { reply.await.map_err(CacheError::from) }).await
    }

    async fn flush_prefix(&self, prefix: &str) -> Result<usize> {
        let pattern = format!("{}*", escape_glob(prefix));
        let mut cursor: u64 = 0;
        let mut removed = 0;

        loop {
            let mut scan = redis::cmd("SCAN");
            scan.arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH);
            let (next, keys): (u64, Vec<String>) = self.query(scan).await?;

            if !keys.is_empty() {
                let mut del = redis::cmd("DEL");
                del.arg(&keys);
                let count: usize = self.query(del).await?;
                removed += count;
            }

            if next == 0 {
                return Ok(removed);
            }
            cursor = next;
        }
    }
}

/// Escapes glob metacharacters so a namespace matches literally.
fn escape_glob(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Milliseconds for `PX`/`PEXPIRE`; Redis rejects zero.
fn millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl RawCache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut cmd = redis::cmd("GET");
        cmd.arg(self.key(key));
        self.query(cmd).await
    }

    /// Without a TTL the configured max-age applies; with neither the key
    /// never expires.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        let ttl = ttl.filter(|ttl| !ttl.is_zero()).or(self.default_ttl);
        let mut cmd = redis::cmd("SET");
        cmd.arg(self.key(key)).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(millis(ttl));
        }
        self.query(cmd).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut cmd = redis::cmd("DEL");
        cmd.arg(self.key(key));
        let _: i64 = self.query(cmd).await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut cmd = redis::cmd("EXISTS");
        cmd.arg(self.key(key));
        let count: i64 = self.query(cmd).await?;
        Ok(count > 0)
    }

    async fn flush(&self) -> Result<()> {
        match &self.prefix {
            Some(prefix) => {
                let removed = self.flush_prefix(prefix).await?;
                info!(prefix = %prefix, removed, "Flushed redis namespace");
                Ok(())
            }
            None => {
                warn!("Flushing entire redis database; configure a name to scope flushes");
                self.query(redis::cmd("FLUSHDB")).await
            }
        }
    }

    async fn close(&self) -> Result<()> {
        if self.conn.write().take().is_some() {
            info!("Redis cache closed");
        }
        Ok(())
    }

    async fn increment(&self, key: &str, delta: i64) -> Result<i64> {
        let mut cmd = redis::cmd("INCRBY");
        cmd.arg(self.key(key)).arg(delta);
        self.query(cmd).await
    }

    async fn decrement(&self, key: &str, delta: i64) -> Result<i64> {
        let mut cmd = redis::cmd("DECRBY");
        cmd.arg(self.key(key)).arg(delta);
        self.query(cmd).await
    }

    /// A zero `ttl` removes the expiration (`PERSIST`).
    async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        let mut cmd = if ttl.is_zero() {
            redis::cmd("PERSIST")
        } else {
            redis::cmd("PEXPIRE")
        };
        cmd.arg(self.key(key));
        if !ttl.is_zero() {
            cmd.arg(millis(ttl));
        }
        let _: i64 = self.query(cmd).await?;
        Ok(())
    }

    fn supports_per_key_ttl(&self) -> bool {
        true
    }
}

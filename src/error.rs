//! Error types for the cache layer
//!
//! Provides unified error handling using thiserror.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for every cache backend and wrapper.
///
/// A missing or expired key is never an error: read paths report it as
/// `Ok(None)` / `Ok(false)`.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Backend could not be reached while it was being constructed
    #[error("Connection failed: {0}")]
    Connection(String),

    /// A remote store rejected or failed an operation
    #[error("Backend error: {0}")]
    Backend(String),

    /// Error reported by the Redis client
    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// JSON encoding or decoding failed
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Binary encoding or decoding failed
    #[error("Binary serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    /// Operation exceeded the configured deadline
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Backend was used after `close`
    #[error("Cache is closed")]
    Closed,

    /// Backend lacks a capability the caller requires
    #[error("Unsupported capability: {0}")]
    UnsupportedCapability(&'static str),

    /// Invalid construction options
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// One or more backends failed to close
    #[error(transparent)]
    Close(#[from] CloseErrors),
}

// == Close Errors ==
/// Every close failure collected during a bulk shutdown, keyed by cache name.
#[derive(Debug, Default)]
pub struct CloseErrors {
    failures: Vec<(String, CacheError)>,
}

impl CloseErrors {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the failure of one named backend.
    pub fn push(&mut self, name: impl Into<String>, error: CacheError) {
        self.failures.push((name.into(), error));
    }

    /// Returns the recorded failures in the order they happened.
    pub fn failures(&self) -> &[(String, CacheError)] {
        &self.failures
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Converts to `Ok(())` when nothing failed.
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(CacheError::Close(self))
        }
    }
}

impl fmt::Display for CloseErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to close {} cache(s)", self.failures.len())?;
        for (i, (name, err)) in self.failures.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{}{}: {}", sep, name, err)?;
        }
        Ok(())
    }
}

impl std::error::Error for CloseErrors {}

// == Result Type Alias ==
/// Convenience Result type for the cache layer.
pub type Result<T> = std::result::Result<T, CacheError>;

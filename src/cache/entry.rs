//! Cache Entry Module
//!
//! Defines the structure for individual in-memory entries with TTL support.

use std::time::{Duration, Instant};

/// Width of an encoded counter value.
pub const COUNTER_WIDTH: usize = 8;

// == Cache Entry ==
/// A stored value with its absolute expiration.
///
/// Entries are immutable once stored; every mutation replaces the whole entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// The stored bytes
    pub value: Vec<u8>,
    /// Expiration instant, None = no expiration
    pub expires_at: Option<Instant>,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new entry expiring `ttl` from now, or never when `ttl` is None.
    pub fn new(value: Vec<u8>, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: expiry_after(ttl),
        }
    }

    /// Creates an entry with an already computed expiration.
    pub fn with_expiry(value: Vec<u8>, expires_at: Option<Instant>) -> Self {
        Self { value, expires_at }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// An entry is expired once the current time is greater than or equal
    /// to its expiration instant.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    pub fn is_expired_at(&self, now: Instant) -> bool {
        match self.expires_at {
            Some(expires) => now >= expires,
            None => false,
        }
    }

    // == Time To Live ==
    /// Returns remaining TTL, or None if no expiration is set.
    ///
    /// # Returns
    /// - `Some(Duration::ZERO)` if the entry has expired
    /// - `Some(remaining)` if the entry has TTL and hasn't expired
    /// - `None` if the entry never expires
    pub fn ttl_remaining(&self) -> Option<Duration> {
        self.expires_at
            .map(|expires| expires.saturating_duration_since(Instant::now()))
    }

    /// Returns a copy of this entry with the same value and a new TTL.
    pub fn with_ttl(&self, ttl: Option<Duration>) -> Self {
        Self::new(self.value.clone(), ttl)
    }

    /// Reads the value as a counter.
    pub fn counter(&self) -> i64 {
        decode_counter(&self.value)
    }
}

/// Deadline `ttl` from now.
///
/// A TTL too large to represent as an `Instant` means no expiration.
pub fn expiry_after(ttl: Option<Duration>) -> Option<Instant> {
    ttl.and_then(|ttl| Instant::now().checked_add(ttl))
}

// == Counter Codec ==
/// Encodes a counter as fixed-width big-endian bytes.
pub fn encode_counter(value: i64) -> Vec<u8> {
    value.to_be_bytes().to_vec()
}

/// Decodes the trailing eight bytes of `bytes` as a big-endian counter.
///
/// Values shorter than eight bytes are not counters and decode as zero.
pub fn decode_counter(bytes: &[u8]) -> i64 {
    if bytes.len() < COUNTER_WIDTH {
        return 0;
    }
    let mut buf = [0u8; COUNTER_WIDTH];
    buf.copy_from_slice(&bytes[bytes.len() - COUNTER_WIDTH..]);
    i64::from_be_bytes(buf)
}

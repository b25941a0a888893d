//! Cache Store Module
//!
//! Main in-memory engine: a sharded concurrent map with lazy TTL expiration,
//! bounded size and compare-and-swap counters.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::cache::entry::{encode_counter, expiry_after, CacheEntry};
use crate::cache::stats::{CacheStats, StatsRecorder};

type EntryMap = DashMap<String, Arc<CacheEntry>>;

/// Result of one compare-and-swap attempt on a counter.
enum Swap {
    Replaced,
    Inserted,
    Conflict,
}

/// One map together with its live entry count.
///
/// `flush` swaps in a fresh generation, so a writer still holding the old
/// one only ever adjusts the count of the map it actually wrote to.
#[derive(Debug, Default)]
struct Generation {
    map: EntryMap,
    len: AtomicUsize,
}

impl Generation {
    fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }
}

// == Memory Store ==
/// Concurrent in-memory storage with TTL support and a live entry cap.
///
/// Writers never take a lock wider than the shard holding their key. The
/// eviction pass is the only operation that serialises, and only against
/// other eviction passes.
#[derive(Debug)]
pub struct MemoryStore {
    /// Current generation, swapped out wholesale by `flush`
    entries: RwLock<Arc<Generation>>,
    /// Maximum number of entries allowed
    max_entries: usize,
    /// TTL applied when a write carries none
    default_ttl: Option<Duration>,
    /// Serialises eviction passes
    eviction: Mutex<()>,
    /// Performance statistics
    stats: StatsRecorder,
}

impl MemoryStore {
    // == Constructor ==
    /// Creates a new store with the given capacity and default TTL.
    ///
    /// # Arguments
    /// * `max_entries` - Maximum number of live entries (at least one)
    /// * `default_ttl` - TTL for writes without one, None = never expire
    pub fn new(max_entries: usize, default_ttl: Option<Duration>) -> Self {
        Self {
            entries: RwLock::new(Arc::new(Generation::default())),
            max_entries: max_entries.max(1),
            default_ttl: default_ttl.filter(|ttl| !ttl.is_zero()),
            eviction: Mutex::new(()),
            stats: StatsRecorder::new(),
        }
    }

    fn current(&self) -> Arc<Generation> {
        self.entries.read().clone()
    }

    fn effective_ttl(&self, ttl: Option<Duration>) -> Option<Duration> {
        ttl.filter(|ttl| !ttl.is_zero()).or(self.default_ttl)
    }

    // == Set ==
    /// Stores a value, replacing any existing entry and its TTL.
    ///
    /// A missing or zero `ttl` falls back to the store's default TTL.
    pub fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) {
        let entry = Arc::new(CacheEntry::new(value, self.effective_ttl(ttl)));
        let generation = self.current();
        if generation.map.insert(key.to_owned(), entry).is_none() {
            self.grow(&generation, key);
        }
    }

    // == Get ==
    /// Retrieves a value by key.
    ///
    /// Expired entries are removed on sight and reported as absent.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let generation = self.current();
        match self.live_entry(&generation, key) {
            Some(entry) => {
                self.stats.record_hit();
                Some(entry.value.clone())
            }
            None => {
                self.stats.record_miss();
                None
            }
        }
    }

    // == Exists ==
    pub fn exists(&self, key: &str) -> bool {
        let generation = self.current();
        self.live_entry(&generation, key).is_some()
    }

    // == Delete ==
    /// Removes an entry. Removing an absent key is a no-op.
    pub fn delete(&self, key: &str) {
        let generation = self.current();
        if generation.map.remove(key).is_some() {
            self.shrink(&generation, 1);
        }
    }

    // == Increment ==
    /// Atomically adds `delta` to the counter stored under `key`.
    ///
    /// A missing or expired key counts as zero. The result is floored at
    /// zero before it is stored. An existing live entry keeps its TTL; a new
    /// counter gets the default TTL.
    pub fn increment(&self, key: &str, delta: i64) -> i64 {
        let generation = self.current();
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            let seen = generation.map.get(key).map(|slot| Arc::clone(slot.value()));
            let live = seen.as_ref().filter(|entry| !entry.is_expired());

            let next = live
                .map_or(0, |entry| entry.counter())
                .saturating_add(delta)
                .max(0);
            let expires_at = match live {
                Some(entry) => entry.expires_at,
                None => expiry_after(self.effective_ttl(None)),
            };
            let replacement = Arc::new(CacheEntry::with_expiry(encode_counter(next), expires_at));

            let outcome = match generation.map.entry(key.to_owned()) {
                Entry::Occupied(mut slot) => match &seen {
                    Some(seen) if Arc::ptr_eq(slot.get(), seen) => {
                        slot.insert(replacement);
                        Swap::Replaced
                    }
                    _ => Swap::Conflict,
                },
                Entry::Vacant(slot) if seen.is_none() => {
                    slot.insert(replacement);
                    Swap::Inserted
                }
                Entry::Vacant(_) => Swap::Conflict,
            };

            match outcome {
                Swap::Conflict => continue,
                Swap::Inserted => self.grow(&generation, key),
                Swap::Replaced => {}
            }

            if attempts > 1 {
                debug!(key, attempts, "Counter update retried after concurrent write");
            }
            return next;
        }
    }

    // == Decrement ==
    pub fn decrement(&self, key: &str, delta: i64) -> i64 {
        self.increment(key, delta.saturating_neg())
    }

    // == Expire ==
    /// Replaces the TTL of a live entry without touching its value.
    ///
    /// A zero `ttl` removes the expiration, as does one too large to
    /// represent. Absent keys are left alone.
    pub fn expire(&self, key: &str, ttl: Duration) {
        let ttl = (!ttl.is_zero()).then_some(ttl);
        let generation = self.current();
        let expired = match generation.map.get_mut(key) {
            Some(mut slot) if !slot.is_expired() => {
                let refreshed = slot.with_ttl(ttl);
                *slot = Arc::new(refreshed);
                false
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            self.remove_if_expired(&generation, key);
        }
    }

    // == TTL ==
    /// Returns the remaining TTL of a live entry.
    ///
    /// `None` means the key is absent; `Some(None)` means it never expires.
    pub fn ttl(&self, key: &str) -> Option<Option<Duration>> {
        let generation = self.current();
        self.live_entry(&generation, key).map(|entry| entry.ttl_remaining())
    }

    // == Flush ==
    /// Replaces the whole map, and its count, with an empty generation.
    ///
    /// Returns the number of entries dropped.
    pub fn flush(&self) -> usize {
        let previous = std::mem::replace(
            &mut *self.entries.write(),
            Arc::new(Generation::default()),
        );
        previous.map.len()
    }

    // == Cleanup Expired ==
    /// Removes all expired entries from the store.
    ///
    /// Iterates shard by shard, so writers are only ever blocked on the shard
    /// currently being read. Returns the number of entries removed.
    pub fn cleanup_expired(&self) -> usize {
        let generation = self.current();
        let now = Instant::now();
        let expired: Vec<String> = generation
            .map
            .iter()
            .filter(|slot| slot.value().is_expired_at(now))
            .map(|slot| slot.key().clone())
            .collect();

        expired
            .iter()
            .filter(|key| self.remove_if_expired(&generation, key))
            .count()
    }

    // == Length ==
    /// Returns the current number of live entries.
    pub fn len(&self) -> usize {
        self.current().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot(self.len())
    }

    /// Returns the entry under `key` if it is live, removing it if expired.
    fn live_entry(&self, generation: &Generation, key: &str) -> Option<Arc<CacheEntry>> {
        let entry = generation.map.get(key).map(|slot| Arc::clone(slot.value()))?;
        if entry.is_expired() {
            self.remove_if_expired(generation, key);
            None
        } else {
            Some(entry)
        }
    }

    fn remove_if_expired(&self, generation: &Generation, key: &str) -> bool {
        let removed = generation
            .map
            .remove_if(key, |_, entry| entry.is_expired())
            .is_some();
        if removed {
            self.shrink(generation, 1);
            self.stats.record_expirations(1);
        }
        removed
    }

    fn grow(&self, generation: &Generation, inserted: &str) {
        let len = generation.len.fetch_add(1, Ordering::AcqRel) + 1;
        if len > self.max_entries {
            self.evict(generation, inserted);
        }
    }

    fn shrink(&self, generation: &Generation, count: usize) {
        let _ = generation
            .len
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |len| {
                Some(len.saturating_sub(count))
            });
    }

    // == Evict ==
    /// Brings the generation back under its cap.
    ///
    /// Expired entries go first. If that is not enough, arbitrary entries
    /// other than `inserted` are removed. There is no recency ordering.
    fn evict(&self, generation: &Generation, inserted: &str) {
        let _pass = self.eviction.lock();
        if generation.len() <= self.max_entries {
            return;
        }

        let now = Instant::now();
        let expired: Vec<String> = generation
            .map
            .iter()
            .filter(|slot| slot.value().is_expired_at(now))
            .map(|slot| slot.key().clone())
            .collect();
        let reclaimed = expired
            .iter()
            .filter(|key| self.remove_if_expired(generation, key))
            .count();

        let excess = generation.len().saturating_sub(self.max_entries);
        let mut evicted = 0;
        if excess > 0 {
            let victims: Vec<String> = generation
                .map
                .iter()
                .map(|slot| slot.key().clone())
                .filter(|key| key.as_str() != inserted)
                .take(excess)
                .collect();
            for key in victims {
                if generation.map.remove(&key).is_some() {
                    self.shrink(generation, 1);
                    self.stats.record_eviction();
                    evicted += 1;
                }
            }
        }

        debug!(reclaimed, evicted, len = generation.len(), "Eviction pass complete");
    }
}

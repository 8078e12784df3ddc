//! Monotonic statistics counters for a cache instance.
//!
//! Counters are incremented while the cache lock is held, but they are plain
//! atomics so snapshots can be taken from any thread without blocking writers.
//! All increments and loads use `Ordering::Relaxed`; the counters are
//! independent and no cross-counter ordering is promised.

use std::sync::atomic::{AtomicU64, Ordering};

/// Internal counter set owned by the cache core.
#[derive(Debug, Default)]
pub(crate) struct Statistics {
    /// Keys removed because the cache was over its size or memory bound.
    evicted_keys: AtomicU64,
    /// Keys removed because their TTL elapsed (lazily or by the janitor).
    expired_keys: AtomicU64,
    /// Lookups that returned a live value.
    hits: AtomicU64,
    /// Lookups that found nothing, including lookups of expired keys.
    misses: AtomicU64,
}

impl Statistics {
    pub(crate) fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            evicted_keys: self.evicted_keys.load(Ordering::Relaxed),
            expired_keys: self.expired_keys.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn inc_evicted(&self) {
        self.evicted_keys.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_expired(&self) {
        self.expired_keys.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }
}

/// Point-in-time view of a cache's [`Statistics`].
///
/// Counters only ever grow; [`Cache::clear`](crate::Cache::clear) does not
/// reset them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Keys evicted under size or memory pressure.
    pub evicted_keys: u64,
    /// Keys reaped because their TTL elapsed.
    pub expired_keys: u64,
    /// Successful lookups.
    pub hits: u64,
    /// Failed lookups.
    pub misses: u64,
}

//! # Cache core and thread-safe facade
//!
//! The engine behind every public operation: a hash index for O(1) lookup
//! coupled to an intrusive doubly-linked ordering list that drives eviction.
//!
//! ## Architecture
//!
//! ```text
//!   ┌───────────────────────────────────────────────────────────────────┐
//!   │                           Cache<V>                                │
//!   │                                                                   │
//!   │   ┌───────────────────────────────────────────────────────────┐   │
//!   │   │              Arc<RwLock<CacheCore<V>>>                    │   │
//!   │   └───────────────────────────────────────────────────────────┘   │
//!   │                               │                                   │
//!   │                               ▼                                   │
//!   │   ┌───────────────────────────────────────────────────────────┐   │
//!   │   │                     CacheCore<V>                          │   │
//!   │   │                                                           │   │
//!   │   │   FxHashMap<String, NonNull<Entry<V>>>   (key index)      │   │
//!   │   │                                                           │   │
//!   │   │   tail ──► [oldest] ◄──► [ ... ] ◄──► [newest] ◄── head   │   │
//!   │   │   (next eviction victim)         (most recently           │   │
//!   │   │                                   inserted/touched)       │   │
//!   │   │                                                           │   │
//!   │   │   memory_usage: Σ weigher(key, value) over live entries   │   │
//!   │   │   stats: evicted / expired / hits / misses                │   │
//!   │   └───────────────────────────────────────────────────────────┘   │
//!   └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every entry's `next` link points toward the head (newer side) and `prev`
//! toward the tail, so the janitor's tail-to-head walk follows `next`.
//!
//! ## Locking discipline
//!
//! One `parking_lot::RwLock` per cache. Operations that only read the index
//! (`count`, `get_keys_by_pattern`, `get_all`, `ttl`, snapshot save) take the
//! read lock. Everything else takes the write lock, including `get`, which
//! may lazily delete an expired entry and, under LRU, repositions the entry
//! at the head. The janitor takes the write lock for one shift at a time.
//!
//! ## Ordering semantics
//!
//! | Operation            | FIFO                  | LRU                    |
//! |----------------------|-----------------------|------------------------|
//! | `set` (new key)      | attach at head        | attach at head         |
//! | `set` (existing key) | move to head          | move to head           |
//! | `get` (hit)          | no movement           | move to head           |
//! | `expire`             | no movement           | no movement            |
//! | eviction             | removes tail          | removes tail           |
//!
//! ## Safety
//!
//! The list is threaded through heap nodes via `NonNull` handles owned by
//! the index. All raw-pointer manipulation happens in four private
//! primitives (`attach_head`, `detach`, `move_to_head`, `remove_node`)
//! called with exclusive access to the core. Debug builds re-validate the
//! list/index coupling after every mutation.

use std::collections::HashMap;
use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

use crate::config::{CacheBuilder, CopyFn};
use crate::entry::Entry;
use crate::error::CacheError;
use crate::janitor::JanitorHandle;
use crate::pattern::match_pattern;
use crate::stats::{Statistics, StatsSnapshot};
use crate::weight::{MemSize, Weigher};
use crate::{NO_MAX_MEMORY_USAGE, NO_MAX_SIZE};

/// Decides which entry the cache sacrifices when it is over its size or
/// memory bound. Both policies evict the tail of the ordering list; they
/// differ in what reaches the tail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvictionPolicy {
    /// Entries are evicted in insertion order; reads never reorder.
    #[default]
    FirstInFirstOut,
    /// Reads promote entries to the head, so the least recently used entry
    /// sits at the tail.
    LeastRecentlyUsed,
}

/// Single-threaded engine: index + ordering list + accounting.
///
/// Never exposed directly; the [`Cache`] facade wraps it in a `RwLock` and
/// decides the lock mode per operation.
pub(crate) struct CacheCore<V> {
    pub(crate) entries: FxHashMap<String, NonNull<Entry<V>>>,
    /// Most recently inserted or touched entry. `head.next` is always `None`.
    pub(crate) head: Option<NonNull<Entry<V>>>,
    /// Next eviction victim. `tail.prev` is always `None`.
    pub(crate) tail: Option<NonNull<Entry<V>>>,
    pub(crate) max_size: usize,
    pub(crate) max_memory_usage: usize,
    pub(crate) policy: EvictionPolicy,
    pub(crate) default_ttl: Option<Duration>,
    pub(crate) weigher: Weigher<V>,
    pub(crate) copy_fn: Option<CopyFn<V>>,
    pub(crate) memory_usage: usize,
    pub(crate) stats: Statistics,
    /// Where the janitor resumes its tail-to-head walk. The pointer may
    /// dangle after a delete; it must never be dereferenced before the
    /// key-and-identity re-check in `sweep_shift`.
    pub(crate) resume: Option<(String, NonNull<Entry<V>>)>,
    /// Expired entries found since the walk last restarted from the tail.
    pub(crate) sweep_tally: usize,
}

// SAFETY: the raw pointers only reference heap nodes owned by this struct;
// no aliasing escapes it. Thread safety is provided by the facade's RwLock,
// so CacheCore moves/shares between threads whenever the key-independent
// payload does. `Arc<V>` requires `V: Send + Sync` for both.
unsafe impl<V: Send + Sync> Send for CacheCore<V> {}
unsafe impl<V: Send + Sync> Sync for CacheCore<V> {}

impl<V> CacheCore<V> {
    pub(crate) fn from_builder(builder: CacheBuilder<V>, weigher: Weigher<V>) -> Self {
        CacheCore {
            entries: FxHashMap::default(),
            head: None,
            tail: None,
            max_size: builder.max_size,
            max_memory_usage: builder.max_memory_usage,
            policy: builder.policy,
            default_ttl: builder.default_ttl,
            weigher,
            copy_fn: builder.copy_fn,
            memory_usage: 0,
            stats: Statistics::default(),
            resume: None,
            sweep_tally: 0,
        }
    }

    // -- write path ---------------------------------------------------------

    pub(crate) fn set(&mut self, key: String, value: V) {
        let ttl = self.default_ttl;
        self.set_with_ttl(key, value, ttl);
    }

    pub(crate) fn set_with_ttl(&mut self, key: String, value: V, ttl: Option<Duration>) {
        let now = SystemTime::now();
        let expiration = ttl.map(|d| now + d);
        let stored = match &self.copy_fn {
            Some(copy) => Arc::new(copy(&value)),
            None => Arc::new(value),
        };
        match self.entries.get(&key).copied() {
            Some(node_ptr) => {
                let weight = (self.weigher)(&key, &stored);
                unsafe {
                    let node = &mut *node_ptr.as_ptr();
                    self.memory_usage = self.memory_usage - node.weight + weight;
                    node.value = stored;
                    node.weight = weight;
                    node.relevant_timestamp = now;
                    node.expiration = expiration;
                }
                // An update always counts as fresh, under both policies.
                self.move_to_head(node_ptr);
            },
            None => {
                // A zero TTL would expire instantly, so don't insert at all.
                if ttl == Some(Duration::ZERO) {
                    return;
                }
                let weight = (self.weigher)(&key, &stored);
                let node = Entry::allocate(key.clone(), stored, now, expiration, weight);
                self.attach_head(node);
                self.entries.insert(key, node);
                self.memory_usage += weight;
            },
        }
        self.enforce_bounds();
        #[cfg(debug_assertions)]
        self.validate_invariants();
    }

    /// Evicts from the tail until both configured bounds hold again.
    fn enforce_bounds(&mut self) {
        if self.max_size != NO_MAX_SIZE {
            while self.entries.len() > self.max_size {
                self.evict_tail();
            }
        }
        if self.max_memory_usage != NO_MAX_MEMORY_USAGE {
            while self.memory_usage > self.max_memory_usage && !self.entries.is_empty() {
                self.evict_tail();
            }
        }
    }

    // -- read path ----------------------------------------------------------

    pub(crate) fn get(&mut self, key: &str) -> Option<Arc<V>> {
        let node_ptr = match self.entries.get(key).copied() {
            Some(ptr) => ptr,
            None => {
                self.stats.inc_miss();
                return None;
            },
        };
        if unsafe { node_ptr.as_ref() }.expired() {
            self.remove_node(node_ptr);
            self.stats.inc_expired();
            self.stats.inc_miss();
            #[cfg(debug_assertions)]
            self.validate_invariants();
            return None;
        }
        if self.policy == EvictionPolicy::LeastRecentlyUsed {
            unsafe { (*node_ptr.as_ptr()).touch() };
            self.move_to_head(node_ptr);
        }
        self.stats.inc_hit();
        let value = unsafe { &node_ptr.as_ref().value };
        Some(match &self.copy_fn {
            Some(copy) => Arc::new(copy(value)),
            None => Arc::clone(value),
        })
    }

    /// Every non-expired entry. Does not reposition, expire, or count
    /// hits/misses; it is an index scan, not a sequence of `get`s.
    pub(crate) fn get_all(&self) -> HashMap<String, Arc<V>> {
        let mut all = HashMap::with_capacity(self.entries.len());
        for (key, node_ptr) in &self.entries {
            let node = unsafe { node_ptr.as_ref() };
            if node.expired() {
                continue;
            }
            let value = match &self.copy_fn {
                Some(copy) => Arc::new(copy(&node.value)),
                None => Arc::clone(&node.value),
            };
            all.insert(key.clone(), value);
        }
        all
    }

    pub(crate) fn keys_by_pattern(&self, pattern: &str, limit: usize) -> Vec<String> {
        let mut matches = Vec::new();
        for (key, node_ptr) in &self.entries {
            // Expired-but-unreaped keys are invisible to pattern scans.
            if unsafe { node_ptr.as_ref() }.expired() {
                continue;
            }
            if match_pattern(pattern, key) {
                matches.push(key.clone());
                if limit != 0 && matches.len() == limit {
                    break;
                }
            }
        }
        matches
    }

    pub(crate) fn ttl(&self, key: &str) -> Result<Duration, CacheError> {
        let node_ptr = self.entries.get(key).ok_or(CacheError::KeyDoesNotExist)?;
        let node = unsafe { node_ptr.as_ref() };
        if node.expiration.is_none() {
            return Err(CacheError::KeyHasNoExpiration);
        }
        // Expired but not yet reaped: observationally the key is gone.
        node.time_until_expiration()
            .ok_or(CacheError::KeyDoesNotExist)
    }

    pub(crate) fn expire(&mut self, key: &str, ttl: Option<Duration>) -> bool {
        let node_ptr = match self.entries.get(key).copied() {
            Some(ptr) => ptr,
            None => return false,
        };
        let node = unsafe { &mut *node_ptr.as_ptr() };
        if node.expired() {
            return false;
        }
        // Deliberately no repositioning, even under LRU.
        node.expiration = ttl.map(|d| SystemTime::now() + d);
        true
    }

    // -- removal ------------------------------------------------------------

    pub(crate) fn delete(&mut self, key: &str) -> bool {
        match self.entries.get(key).copied() {
            Some(node_ptr) => {
                self.remove_node(node_ptr);
                #[cfg(debug_assertions)]
                self.validate_invariants();
                true
            },
            None => false,
        }
    }

    pub(crate) fn clear(&mut self) {
        while let Some(tail_ptr) = self.tail {
            self.remove_node(tail_ptr);
        }
        self.resume = None;
        self.sweep_tally = 0;
        debug_assert!(self.entries.is_empty());
        debug_assert_eq!(self.memory_usage, 0);
    }

    /// Removes the tail and charges it to the eviction counter.
    pub(crate) fn evict_tail(&mut self) {
        let Some(tail_ptr) = self.tail else { return };
        self.remove_node(tail_ptr);
        self.stats.inc_evicted();
    }

    /// Unlinks the node, drops it out of the index, subtracts its weight,
    /// and frees it. Callers decide which statistic (if any) to bump.
    pub(crate) fn remove_node(&mut self, node_ptr: NonNull<Entry<V>>) {
        self.detach(node_ptr);
        let node = unsafe { Box::from_raw(node_ptr.as_ptr()) };
        self.entries.remove(&node.key);
        self.memory_usage -= node.weight;
    }

    // -- ordering-list primitives -------------------------------------------

    /// Links a detached node in as the new head.
    pub(crate) fn attach_head(&mut self, mut node_ptr: NonNull<Entry<V>>) {
        unsafe {
            let node = node_ptr.as_mut();
            node.next = None;
            node.prev = self.head;
            match self.head {
                Some(mut head) => head.as_mut().next = Some(node_ptr),
                None => self.tail = Some(node_ptr),
            }
            self.head = Some(node_ptr);
        }
    }

    /// Unlinks a node from the list without touching the index.
    fn detach(&mut self, node_ptr: NonNull<Entry<V>>) {
        unsafe {
            let node = node_ptr.as_ref();
            let prev = node.prev;
            let next = node.next;
            match next {
                Some(mut newer) => newer.as_mut().prev = prev,
                None => self.head = prev,
            }
            match prev {
                Some(mut older) => older.as_mut().next = next,
                None => self.tail = next,
            }
        }
    }

    pub(crate) fn move_to_head(&mut self, node_ptr: NonNull<Entry<V>>) {
        if self.head == Some(node_ptr) {
            return;
        }
        self.detach(node_ptr);
        self.attach_head(node_ptr);
    }

    // -- accessors ----------------------------------------------------------

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Validates the list/index coupling (debug builds only).
    #[cfg(debug_assertions)]
    pub(crate) fn validate_invariants(&self) {
        if self.entries.is_empty() {
            debug_assert!(self.head.is_none());
            debug_assert!(self.tail.is_none());
            return;
        }
        let head = self.head.expect("non-empty cache must have a head");
        let tail = self.tail.expect("non-empty cache must have a tail");
        unsafe {
            debug_assert!(head.as_ref().next.is_none());
            debug_assert!(tail.as_ref().prev.is_none());
        }
        let mut count = 0usize;
        let mut current = self.tail;
        while let Some(ptr) = current {
            count += 1;
            unsafe {
                let node = ptr.as_ref();
                debug_assert_eq!(self.entries.get(&node.key).copied(), Some(ptr));
                current = node.next;
            }
            if count > self.entries.len() {
                panic!("cycle detected in ordering list");
            }
        }
        debug_assert_eq!(count, self.entries.len());
    }
}

impl<V> Drop for CacheCore<V> {
    fn drop(&mut self) {
        while let Some(tail_ptr) = self.tail {
            self.remove_node(tail_ptr);
        }
    }
}

// ===========================================================================
// Thread-safe facade
// ===========================================================================

/// Bounded key/value cache with TTL support, pluggable eviction, and binary
/// snapshots.
///
/// Cloning is cheap and every clone points at the same underlying cache.
/// One instance is safe under any number of concurrent callers.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use stashkit::{Cache, EvictionPolicy};
///
/// let cache: Cache<String> = Cache::builder()
///     .with_max_size(3)
///     .with_eviction_policy(EvictionPolicy::LeastRecentlyUsed)
///     .build();
///
/// cache.set("session", "token".to_string());
/// cache.set_with_ttl("flash", "message".to_string(), Some(Duration::from_secs(60)));
///
/// assert_eq!(cache.get("session").as_deref(), Some(&"token".to_string()));
/// assert!(cache.ttl("flash").unwrap() <= Duration::from_secs(60));
/// ```
pub struct Cache<V> {
    pub(crate) core: Arc<RwLock<CacheCore<V>>>,
    pub(crate) janitor: Arc<Mutex<Option<JanitorHandle>>>,
}

impl<V> Clone for Cache<V> {
    fn clone(&self) -> Self {
        Cache {
            core: Arc::clone(&self.core),
            janitor: Arc::clone(&self.janitor),
        }
    }
}

impl<V> fmt::Debug for Cache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self.core.read();
        f.debug_struct("Cache")
            .field("count", &core.len())
            .field("max_size", &core.max_size)
            .field("max_memory_usage", &core.max_memory_usage)
            .field("memory_usage", &core.memory_usage)
            .field("eviction_policy", &core.policy)
            .finish_non_exhaustive()
    }
}

impl<V: MemSize> Cache<V> {
    /// Creates a cache with the default configuration: max size
    /// [`DEFAULT_MAX_SIZE`](crate::DEFAULT_MAX_SIZE), unbounded memory, FIFO
    /// eviction, no default TTL.
    pub fn new() -> Self {
        Cache::builder().build()
    }
}

impl<V: MemSize> Default for Cache<V> {
    fn default() -> Self {
        Cache::new()
    }
}

impl<V> Cache<V> {
    /// Starts configuring a cache. See [`CacheBuilder`].
    pub fn builder() -> CacheBuilder<V> {
        CacheBuilder::new()
    }

    pub(crate) fn from_core(core: CacheCore<V>) -> Self {
        Cache {
            core: Arc::new(RwLock::new(core)),
            janitor: Arc::new(Mutex::new(None)),
        }
    }

    /// Creates or updates a key. With a default TTL configured the entry
    /// expires after it; otherwise it never expires.
    pub fn set(&self, key: impl Into<String>, value: V) {
        self.core.write().set(key.into(), value);
    }

    /// Creates or updates a key with an explicit TTL. `None` means the entry
    /// never expires. A TTL of zero on a new key is a no-op (the entry would
    /// expire instantly); on an existing key it expires the entry.
    pub fn set_with_ttl(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) {
        self.core.write().set_with_ttl(key.into(), value, ttl);
    }

    /// Stores every pair. No atomicity across keys beyond what one lock
    /// acquisition provides; interleave-sensitive callers should not rely on
    /// it.
    pub fn set_all(&self, entries: impl IntoIterator<Item = (String, V)>) {
        let mut core = self.core.write();
        for (key, value) in entries {
            core.set(key, value);
        }
    }

    /// Retrieves a value. Counts a hit or miss, lazily deletes the entry if
    /// it expired, and under LRU promotes the entry to the head.
    pub fn get(&self, key: &str) -> Option<Arc<V>> {
        self.core.write().get(key)
    }

    /// `get` for every requested key. Missing and expired keys map to
    /// `None`.
    pub fn get_by_keys<I, S>(&self, keys: I) -> HashMap<String, Option<Arc<V>>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut core = self.core.write();
        keys.into_iter()
            .map(|key| {
                let key = key.into();
                let value = core.get(&key);
                (key, value)
            })
            .collect()
    }

    /// Every non-expired entry. Unlike `get`, this neither repositions
    /// entries nor touches the statistics.
    pub fn get_all(&self) -> HashMap<String, Arc<V>> {
        self.core.read().get_all()
    }

    /// Keys matching a glob pattern (see [`match_pattern`]). `limit == 0`
    /// means no limit. Expired-but-unreaped keys are filtered out. Order is
    /// unspecified.
    pub fn get_keys_by_pattern(&self, pattern: &str, limit: usize) -> Vec<String> {
        self.core.read().keys_by_pattern(pattern, limit)
    }

    /// Removes a key. Returns whether it existed.
    pub fn delete(&self, key: &str) -> bool {
        self.core.write().delete(key)
    }

    /// Removes every listed key, returning how many actually existed.
    pub fn delete_all<I, S>(&self, keys: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut core = self.core.write();
        keys.into_iter()
            .filter(|key| core.delete(key.as_ref()))
            .count()
    }

    /// Removes every non-expired key matching the pattern, returning the
    /// number deleted.
    pub fn delete_keys_by_pattern(&self, pattern: &str) -> usize {
        let mut core = self.core.write();
        let matches = core.keys_by_pattern(pattern, 0);
        matches.iter().filter(|key| core.delete(key)).count()
    }

    /// Remaining time before the key expires.
    ///
    /// # Errors
    ///
    /// [`CacheError::KeyDoesNotExist`] if the key is absent or already
    /// expired; [`CacheError::KeyHasNoExpiration`] if it was stored without
    /// a TTL.
    pub fn ttl(&self, key: &str) -> Result<Duration, CacheError> {
        self.core.read().ttl(key)
    }

    /// Re-arms or clears a key's expiration. `None` clears it; a zero TTL
    /// expires the key on its next access or janitor visit. Returns `false`
    /// if the key is absent or already expired. Never repositions the entry.
    pub fn expire(&self, key: &str, ttl: Option<Duration>) -> bool {
        self.core.write().expire(key, ttl)
    }

    /// Number of entries, expired-but-unreaped ones included.
    pub fn count(&self) -> usize {
        self.core.read().len()
    }

    /// Removes every entry and resets memory usage to zero. Statistics
    /// counters are preserved.
    pub fn clear(&self) {
        self.core.write().clear();
    }

    /// Current sum of entry weights, in bytes.
    pub fn memory_usage(&self) -> usize {
        self.core.read().memory_usage
    }

    /// Configured entry bound; [`NO_MAX_SIZE`] means unbounded.
    pub fn max_size(&self) -> usize {
        self.core.read().max_size
    }

    /// Configured byte bound; [`NO_MAX_MEMORY_USAGE`] means unbounded.
    pub fn max_memory_usage(&self) -> usize {
        self.core.read().max_memory_usage
    }

    pub fn eviction_policy(&self) -> EvictionPolicy {
        self.core.read().policy
    }

    /// Point-in-time statistics counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.core.read().stats.snapshot()
    }
}

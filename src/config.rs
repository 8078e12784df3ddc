//! Cache construction and configuration.
//!
//! Every tunable is optional; the builder starts from the same defaults the
//! plain constructor uses (max size [`DEFAULT_MAX_SIZE`](crate::DEFAULT_MAX_SIZE),
//! unbounded memory, FIFO eviction, no default TTL, shared values).
//!
//! ## Example
//!
//! ```
//! use std::time::Duration;
//! use stashkit::{Cache, EvictionPolicy, MEGABYTE};
//!
//! let cache: Cache<String> = Cache::builder()
//!     .with_max_size(10_000)
//!     .with_max_memory_usage(64 * MEGABYTE)
//!     .with_eviction_policy(EvictionPolicy::LeastRecentlyUsed)
//!     .with_default_ttl(Duration::from_secs(300))
//!     .build();
//! assert_eq!(cache.max_size(), 10_000);
//! ```

use std::sync::Arc;
use std::time::Duration;

use crate::cache::{Cache, CacheCore, EvictionPolicy};
use crate::weight::{default_weigher, MemSize, Weigher};
use crate::DEFAULT_MAX_SIZE;

/// Deep-copy hook applied to values on store and on read, so that callers
/// mutating what they put in (or got out) can never corrupt cached state.
pub type CopyFn<V> = Arc<dyn Fn(&V) -> V + Send + Sync>;

/// Configures and builds a [`Cache`].
pub struct CacheBuilder<V> {
    pub(crate) max_size: usize,
    pub(crate) max_memory_usage: usize,
    pub(crate) policy: EvictionPolicy,
    pub(crate) default_ttl: Option<Duration>,
    pub(crate) copy_fn: Option<CopyFn<V>>,
}

impl<V> CacheBuilder<V> {
    pub fn new() -> Self {
        CacheBuilder {
            max_size: DEFAULT_MAX_SIZE,
            max_memory_usage: crate::NO_MAX_MEMORY_USAGE,
            policy: EvictionPolicy::default(),
            default_ttl: None,
            copy_fn: None,
        }
    }

    /// Maximum number of entries. [`NO_MAX_SIZE`](crate::NO_MAX_SIZE) (zero)
    /// disables the bound, and with it size-based eviction.
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    /// Maximum total entry weight in bytes.
    /// [`NO_MAX_MEMORY_USAGE`](crate::NO_MAX_MEMORY_USAGE) (zero) disables
    /// the bound.
    pub fn with_max_memory_usage(mut self, max_memory_usage: usize) -> Self {
        self.max_memory_usage = max_memory_usage;
        self
    }

    /// Defaults to [`EvictionPolicy::FirstInFirstOut`].
    pub fn with_eviction_policy(mut self, policy: EvictionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// TTL applied whenever [`Cache::set`] is called without an explicit
    /// one. Without it, plain `set` stores entries that never expire.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Installs a deep-copy hook; see [`CopyFn`]. Without one, values are
    /// shared between the cache and its callers through the returned `Arc`.
    pub fn with_copy_fn(mut self, copy_fn: impl Fn(&V) -> V + Send + Sync + 'static) -> Self {
        self.copy_fn = Some(Arc::new(copy_fn));
        self
    }

    /// Builds the cache with a caller-supplied weigher, for value types
    /// without a [`MemSize`] implementation.
    pub fn build_with_weigher(
        self,
        weigher: impl Fn(&str, &V) -> usize + Send + Sync + 'static,
    ) -> Cache<V> {
        let weigher: Weigher<V> = Arc::new(weigher);
        Cache::from_core(CacheCore::from_builder(self, weigher))
    }
}

impl<V: MemSize> CacheBuilder<V> {
    /// Builds the cache with the default weigher
    /// (`ENTRY_OVERHEAD + key length + value.mem_size()`).
    pub fn build(self) -> Cache<V> {
        let weigher = default_weigher::<V>();
        Cache::from_core(CacheCore::from_builder(self, weigher))
    }
}

impl<V> Default for CacheBuilder<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults_match_plain_constructor() {
        let built: Cache<String> = Cache::builder().build();
        let plain: Cache<String> = Cache::new();
        assert_eq!(built.max_size(), plain.max_size());
        assert_eq!(built.max_memory_usage(), plain.max_memory_usage());
        assert_eq!(built.eviction_policy(), plain.eviction_policy());
    }

    #[test]
    fn every_tunable_is_applied() {
        let cache: Cache<String> = Cache::builder()
            .with_max_size(7)
            .with_max_memory_usage(1234)
            .with_eviction_policy(EvictionPolicy::LeastRecentlyUsed)
            .with_default_ttl(Duration::from_secs(1))
            .build();
        assert_eq!(cache.max_size(), 7);
        assert_eq!(cache.max_memory_usage(), 1234);
        assert_eq!(cache.eviction_policy(), EvictionPolicy::LeastRecentlyUsed);
    }

    #[test]
    fn build_with_weigher_accepts_opaque_values() {
        struct Opaque {
            payload: [u8; 16],
        }
        let cache: Cache<Opaque> = Cache::builder()
            .build_with_weigher(|key, value: &Opaque| key.len() + value.payload.len());
        cache.set("k", Opaque { payload: [0; 16] });
        assert_eq!(cache.memory_usage(), 17);
    }
}

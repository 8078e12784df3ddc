//! stashkit: a bounded in-process key/value cache.
//!
//! Size- and memory-bounded storage with FIFO or LRU eviction, per-entry
//! TTLs with lazy and background expiration, glob-pattern key scans, and
//! best-effort binary snapshots.
//!
//! ```
//! use std::time::Duration;
//! use stashkit::{Cache, EvictionPolicy};
//!
//! let cache: Cache<String> = Cache::builder()
//!     .with_max_size(10_000)
//!     .with_eviction_policy(EvictionPolicy::LeastRecentlyUsed)
//!     .build();
//!
//! cache.set("user:42", "alice".to_string());
//! cache.set_with_ttl("otp:42", "391042".to_string(), Some(Duration::from_secs(30)));
//!
//! assert_eq!(cache.get("user:42").as_deref(), Some(&"alice".to_string()));
//! assert_eq!(cache.get_keys_by_pattern("user:*", 0).len(), 1);
//! ```

mod cache;
mod config;
mod entry;
mod error;
mod janitor;
pub mod pattern;
mod persistence;
mod stats;
mod weight;

#[cfg(feature = "server")]
pub mod server;

pub use cache::{Cache, EvictionPolicy};
pub use config::{CacheBuilder, CopyFn};
pub use error::CacheError;
pub use janitor::{
    JANITOR_MAX_ITERATIONS_PER_SHIFT, JANITOR_MAX_SHIFT_BACKOFF, JANITOR_MIN_SHIFT_BACKOFF,
    JANITOR_SHIFT_TARGET,
};
pub use stats::StatsSnapshot;
pub use weight::{MemSize, Weigher, ENTRY_OVERHEAD, GIGABYTE, KILOBYTE, MEGABYTE};

/// A `max_size` of zero disables the entry bound and size-based eviction.
pub const NO_MAX_SIZE: usize = 0;

/// Entry bound used when none is configured.
pub const DEFAULT_MAX_SIZE: usize = 1000;

/// A `max_memory_usage` of zero disables the byte bound.
pub const NO_MAX_MEMORY_USAGE: usize = 0;

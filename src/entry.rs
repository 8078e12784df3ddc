//! A single cached record, threaded into the ordering list.
//!
//! Entries are heap nodes owned by the cache core. The `prev`/`next` links
//! make every entry a member of the intrusive doubly-linked ordering list:
//! `next` points toward the head (newer side), `prev` toward the tail (older
//! side). The cache holds each node through a `NonNull` in its key index and
//! frees it with `Box::from_raw` on removal.

use std::ptr::NonNull;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Node layout keeps the list links first so traversal touches the first
/// cache line before the key/value payload.
#[repr(C)]
pub(crate) struct Entry<V> {
    /// Neighbor toward the tail (older). `None` at the tail.
    pub(crate) prev: Option<NonNull<Entry<V>>>,
    /// Neighbor toward the head (newer). `None` at the head.
    pub(crate) next: Option<NonNull<Entry<V>>>,
    /// Immutable once the entry is created.
    pub(crate) key: String,
    pub(crate) value: Arc<V>,
    /// Creation instant under FIFO, last-access instant under LRU. Only used
    /// to rebuild the ordering list after a snapshot load.
    pub(crate) relevant_timestamp: SystemTime,
    /// `None` means the entry never expires. Wall-clock so deadlines survive
    /// a snapshot round-trip.
    pub(crate) expiration: Option<SystemTime>,
    /// Byte-cost computed by the weigher when the value was stored.
    pub(crate) weight: usize,
}

impl<V> Entry<V> {
    /// Allocates a detached node and leaks it to a raw handle. The caller
    /// links it into the list and index, and owns the eventual
    /// `Box::from_raw`.
    pub(crate) fn allocate(
        key: String,
        value: Arc<V>,
        relevant_timestamp: SystemTime,
        expiration: Option<SystemTime>,
        weight: usize,
    ) -> NonNull<Entry<V>> {
        let node = Box::new(Entry {
            prev: None,
            next: None,
            key,
            value,
            relevant_timestamp,
            expiration,
            weight,
        });
        // Box::into_raw never returns null.
        unsafe { NonNull::new_unchecked(Box::into_raw(node)) }
    }

    /// Whether the entry's deadline has passed.
    pub(crate) fn expired(&self) -> bool {
        match self.expiration {
            Some(deadline) => SystemTime::now() > deadline,
            None => false,
        }
    }

    /// Remaining time before expiration, if any. `None` when the deadline
    /// already passed.
    pub(crate) fn time_until_expiration(&self) -> Option<Duration> {
        let deadline = self.expiration?;
        deadline.duration_since(SystemTime::now()).ok()
    }

    /// Refreshes the ordering timestamp; called on access under LRU and on
    /// every update.
    pub(crate) fn touch(&mut self) {
        self.relevant_timestamp = SystemTime::now();
    }
}

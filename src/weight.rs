//! Byte-cost accounting for cached entries.
//!
//! The cache tracks a running `memory_usage` equal to the sum of a per-entry
//! *weight*, computed once on every store by a [`Weigher`]. The default
//! weigher charges a fixed [`ENTRY_OVERHEAD`] for the node bookkeeping plus
//! the key length plus the value's [`MemSize`] cost.
//!
//! Weights approximate the in-RAM footprint; exactness is not the contract.
//! What *is* the contract is determinism: storing an equal value under the
//! same key must produce the same weight, so overwriting an entry with an
//! identical value leaves `memory_usage` unchanged.
//!
//! ## Weigher Examples
//!
//! ```
//! use stashkit::Cache;
//!
//! // Default weigher (value type implements MemSize):
//! let cache: Cache<String> = Cache::builder().build();
//!
//! // Custom weigher for an opaque type:
//! struct Document { body: String }
//! let cache: Cache<Document> = Cache::builder()
//!     .build_with_weigher(|key, doc: &Document| key.len() + doc.body.len());
//! ```

use std::sync::Arc;

/// 1024 bytes.
pub const KILOBYTE: usize = 1024;
/// 1024 kilobytes.
pub const MEGABYTE: usize = 1024 * KILOBYTE;
/// 1024 megabytes.
pub const GIGABYTE: usize = 1024 * MEGABYTE;

/// Fixed byte-cost charged per entry on top of the key and value costs.
///
/// Covers the list links, timestamps, precomputed weight, and the key/value
/// container headers. The exact figure matters less than it being constant.
pub const ENTRY_OVERHEAD: usize = 96;

/// Function from `(key, value)` to an approximate byte-cost.
pub type Weigher<V> = Arc<dyn Fn(&str, &V) -> usize + Send + Sync>;

/// Builds the default weigher for value types with a known [`MemSize`].
pub(crate) fn default_weigher<V: MemSize>() -> Weigher<V> {
    Arc::new(|key, value| ENTRY_OVERHEAD + key.len() + value.mem_size())
}

/// Approximate in-memory byte cost of a value.
///
/// Primitives cost their width, strings cost their length, collections cost
/// the sum of their elements. Implement this for your own value types to use
/// the default weigher, or supply a custom weigher instead.
pub trait MemSize {
    /// Approximate number of bytes this value occupies.
    fn mem_size(&self) -> usize;
}

macro_rules! mem_size_for_width {
    ($($ty:ty => $bytes:expr),* $(,)?) => {
        $(
            impl MemSize for $ty {
                #[inline]
                fn mem_size(&self) -> usize {
                    $bytes
                }
            }
        )*
    };
}

mem_size_for_width! {
    bool => 1,
    i8 => 1,
    u8 => 1,
    i16 => 2,
    u16 => 2,
    i32 => 4,
    u32 => 4,
    f32 => 4,
    char => 4,
    i64 => 8,
    u64 => 8,
    f64 => 8,
    isize => 8,
    usize => 8,
    i128 => 16,
    u128 => 16,
    () => 0,
}

impl MemSize for str {
    #[inline]
    fn mem_size(&self) -> usize {
        self.len()
    }
}

impl MemSize for String {
    #[inline]
    fn mem_size(&self) -> usize {
        self.len()
    }
}

impl<T: MemSize> MemSize for [T] {
    fn mem_size(&self) -> usize {
        self.iter().map(MemSize::mem_size).sum()
    }
}

impl<T: MemSize> MemSize for Vec<T> {
    fn mem_size(&self) -> usize {
        self.as_slice().mem_size()
    }
}

impl<T: MemSize> MemSize for Option<T> {
    fn mem_size(&self) -> usize {
        1 + self.as_ref().map_or(0, MemSize::mem_size)
    }
}

impl<T: MemSize + ?Sized> MemSize for Box<T> {
    fn mem_size(&self) -> usize {
        (**self).mem_size()
    }
}

impl<T: MemSize + ?Sized> MemSize for Arc<T> {
    fn mem_size(&self) -> usize {
        (**self).mem_size()
    }
}

impl<T: MemSize + ?Sized> MemSize for &T {
    fn mem_size(&self) -> usize {
        (**self).mem_size()
    }
}

impl<A: MemSize, B: MemSize> MemSize for (A, B) {
    fn mem_size(&self) -> usize {
        self.0.mem_size() + self.1.mem_size()
    }
}

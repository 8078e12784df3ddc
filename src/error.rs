//! Error types for the stashkit library.
//!
//! ## Key Components
//!
//! - [`CacheError`]: every recoverable failure the public API can report.
//!
//! Errors are always returned to the caller; nothing in the core logs and
//! swallows a failure. Internal invariant violations (e.g. a corrupted
//! ordering list) are programmer errors and abort via debug assertions
//! rather than surfacing here.
//!
//! ## Example Usage
//!
//! ```
//! use stashkit::{Cache, CacheError};
//!
//! let cache: Cache<String> = Cache::builder().build();
//! match cache.ttl("missing") {
//!     Err(CacheError::KeyDoesNotExist) => {},
//!     other => panic!("unexpected: {:?}", other),
//! }
//! ```

use std::fmt;
use std::io;

/// Error returned by fallible cache operations.
#[derive(Debug)]
pub enum CacheError {
    /// The requested key is not in the cache, or has already expired.
    KeyDoesNotExist,
    /// The key exists but was stored without an expiration, so it has no TTL.
    KeyHasNoExpiration,
    /// `start_janitor` was called while a janitor is already running.
    JanitorAlreadyRunning,
    /// A snapshot read/write failed at the file-system level.
    Io(io::Error),
    /// A snapshot payload could not be encoded or decoded.
    Codec(bincode::Error),
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::KeyDoesNotExist => f.write_str("key does not exist"),
            CacheError::KeyHasNoExpiration => f.write_str("key has no expiration"),
            CacheError::JanitorAlreadyRunning => f.write_str("janitor is already running"),
            CacheError::Io(err) => write!(f, "snapshot i/o error: {err}"),
            CacheError::Codec(err) => write!(f, "snapshot codec error: {err}"),
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CacheError::Io(err) => Some(err),
            CacheError::Codec(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for CacheError {
    fn from(err: io::Error) -> Self {
        CacheError::Io(err)
    }
}

impl From<bincode::Error> for CacheError {
    fn from(err: bincode::Error) -> Self {
        CacheError::Codec(err)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

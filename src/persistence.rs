//! Binary snapshots of a cache's contents.
//!
//! A snapshot serializes the key index (not the ordering list) to a file:
//! a 4-byte magic, a format version, and a bincode-encoded vector of
//! `(key, value, relevant_timestamp, expiration)` records. On load the
//! ordering list is rebuilt from the per-entry timestamps: records are
//! sorted oldest-first and relinked tail → head, so the oldest loaded entry
//! is the first eviction victim, exactly as if the entries had been inserted
//! in their original order.
//!
//! Expirations are persisted. An entry whose deadline passed while the
//! snapshot sat on disk loads normally and is reaped by the first janitor
//! shift or lazy `get` that touches it.
//!
//! Snapshots are best-effort, not a durability mechanism: there is no
//! fsync discipline, and compatibility across format versions is not
//! guaranteed. Saving blocks writers (read lock held across file I/O);
//! callers that cannot tolerate that should snapshot a separate cache copy.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::cache::{Cache, CacheCore};
use crate::entry::Entry;
use crate::error::CacheError;
use crate::{NO_MAX_MEMORY_USAGE, NO_MAX_SIZE};

const SNAPSHOT_MAGIC: [u8; 4] = *b"SKC1";
const SNAPSHOT_VERSION: u16 = 1;

/// Owned record decoded from a snapshot.
#[derive(Deserialize)]
struct SnapshotRecord<V> {
    key: String,
    value: V,
    relevant_timestamp: SystemTime,
    expiration: Option<SystemTime>,
}

/// Borrowed record encoded into a snapshot; field order must match
/// [`SnapshotRecord`].
#[derive(Serialize)]
struct SnapshotRecordRef<'a, V> {
    key: &'a str,
    value: &'a V,
    relevant_timestamp: SystemTime,
    expiration: Option<SystemTime>,
}

fn codec_error(message: String) -> CacheError {
    CacheError::Codec(Box::new(bincode::ErrorKind::Custom(message)))
}

impl<V: Serialize> Cache<V> {
    /// Writes every entry to `path`, truncating any existing file. The read
    /// lock is held for the duration, so concurrent reads proceed while
    /// writes wait.
    ///
    /// # Errors
    ///
    /// [`CacheError::Io`] for file-system failures, [`CacheError::Codec`]
    /// if a value refuses to serialize.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), CacheError> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&SNAPSHOT_MAGIC)?;
        bincode::serialize_into(&mut writer, &SNAPSHOT_VERSION)?;

        let core = self.core.read();
        let records: Vec<SnapshotRecordRef<'_, V>> = core
            .entries
            .values()
            .map(|node_ptr| {
                let node = unsafe { node_ptr.as_ref() };
                SnapshotRecordRef {
                    key: &node.key,
                    value: node.value.as_ref(),
                    relevant_timestamp: node.relevant_timestamp,
                    expiration: node.expiration,
                }
            })
            .collect();
        bincode::serialize_into(&mut writer, &records)?;
        drop(core);

        writer.flush()?;
        Ok(())
    }
}

impl<V: DeserializeOwned> Cache<V> {
    /// Replaces the cache's contents with a snapshot previously written by
    /// [`save_to_file`](Cache::save_to_file), then enforces this cache's own
    /// `max_size` and `max_memory_usage` by evicting from the rebuilt tail.
    ///
    /// Returns the number of entries evicted while enforcing the bounds, so
    /// a caller loading into a smaller cache can tell how much was shed.
    /// The snapshot file is never modified; reconfigure and retry freely.
    ///
    /// A decode failure leaves the current contents untouched.
    ///
    /// # Errors
    ///
    /// [`CacheError::Io`] for file-system failures, [`CacheError::Codec`]
    /// for a foreign or corrupt payload.
    pub fn read_from_file(&self, path: impl AsRef<Path>) -> Result<usize, CacheError> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);

        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if magic != SNAPSHOT_MAGIC {
            return Err(codec_error("not a stashkit snapshot".to_string()));
        }
        let version: u16 = bincode::deserialize_from(&mut reader)?;
        if version != SNAPSHOT_VERSION {
            return Err(codec_error(format!(
                "unsupported snapshot version {version} (expected {SNAPSHOT_VERSION})"
            )));
        }

        let records: Vec<SnapshotRecord<V>> = bincode::deserialize_from(&mut reader)?;
        Ok(self.core.write().install_snapshot(records))
    }
}

impl<V> CacheCore<V> {
    /// Replaces the contents with decoded records and rebuilds the ordering
    /// list from their timestamps. Returns the number of bound-enforcement
    /// evictions.
    fn install_snapshot(&mut self, mut records: Vec<SnapshotRecord<V>>) -> usize {
        self.clear();

        // Oldest first, so attaching each record at the head leaves the
        // oldest entry at the tail.
        records.sort_by_key(|record| record.relevant_timestamp);
        for record in records {
            let value = Arc::new(record.value);
            let weight = (self.weigher)(&record.key, &value);
            let node = Entry::allocate(
                record.key.clone(),
                value,
                record.relevant_timestamp,
                record.expiration,
                weight,
            );
            self.attach_head(node);
            self.entries.insert(record.key, node);
            self.memory_usage += weight;
        }

        let mut evicted = 0usize;
        if self.max_size != NO_MAX_SIZE {
            while self.entries.len() > self.max_size {
                self.evict_tail();
                evicted += 1;
            }
        }
        if self.max_memory_usage != NO_MAX_MEMORY_USAGE {
            while self.memory_usage > self.max_memory_usage && !self.entries.is_empty() {
                self.evict_tail();
                evicted += 1;
            }
        }
        #[cfg(debug_assertions)]
        self.validate_invariants();
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::thread::sleep;
    use std::time::Duration;

    /// Unique per test-process path under the system temp dir; removed by
    /// the guard when the test ends.
    struct TempSnapshot(PathBuf);

    impl TempSnapshot {
        fn new(name: &str) -> Self {
            let path = std::env::temp_dir().join(format!(
                "stashkit-{name}-{}.snapshot",
                std::process::id()
            ));
            TempSnapshot(path)
        }

        fn path(&self) -> &Path {
            &self.0
        }
    }

    impl Drop for TempSnapshot {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.0);
        }
    }

    #[test]
    fn round_trip_preserves_values_and_ordering() {
        let snapshot = TempSnapshot::new("round-trip");
        let cache: Cache<String> = Cache::new();
        for key in ["oldest", "middle", "newest"] {
            cache.set(key, format!("value-{key}"));
            sleep(Duration::from_millis(2));
        }
        cache.save_to_file(snapshot.path()).unwrap();

        let restored: Cache<String> = Cache::new();
        let evicted = restored.read_from_file(snapshot.path()).unwrap();
        assert_eq!(evicted, 0);
        assert_eq!(restored.count(), 3);
        for key in ["oldest", "middle", "newest"] {
            assert_eq!(
                restored.get(key).as_deref(),
                Some(&format!("value-{key}")),
            );
        }

        let core = restored.core.read();
        assert_eq!(unsafe { &core.head.unwrap().as_ref().key }, "newest");
        assert_eq!(unsafe { &core.tail.unwrap().as_ref().key }, "oldest");
    }

    #[test]
    fn loading_into_a_smaller_cache_evicts_the_oldest() {
        let snapshot = TempSnapshot::new("shrink");
        let cache: Cache<String> = Cache::builder().with_max_size(NO_MAX_SIZE).build();
        for i in 0..100 {
            cache.set(i.to_string(), format!("v{i}"));
            // Distinct timestamps keep the rebuilt ordering unambiguous.
            if i < 5 {
                sleep(Duration::from_millis(1));
            }
        }
        cache.save_to_file(snapshot.path()).unwrap();

        let restored: Cache<String> = Cache::builder().with_max_size(97).build();
        let evicted = restored.read_from_file(snapshot.path()).unwrap();
        assert_eq!(evicted, 3);
        assert_eq!(restored.count(), 97);
        assert_eq!(restored.stats().evicted_keys, 3);
        for i in 0..3 {
            assert!(restored.get(&i.to_string()).is_none());
        }
        for i in 3..100 {
            assert_eq!(
                restored.get(&i.to_string()).as_deref(),
                Some(&format!("v{i}")),
            );
        }
    }

    #[test]
    fn memory_bound_is_enforced_on_load() {
        let snapshot = TempSnapshot::new("memory-bound");
        let cache: Cache<String> = Cache::new();
        for i in 0..10 {
            cache.set(i.to_string(), "0".repeat(crate::KILOBYTE));
        }
        cache.save_to_file(snapshot.path()).unwrap();

        let restored: Cache<String> = Cache::builder()
            .with_max_size(NO_MAX_SIZE)
            .with_max_memory_usage(4 * crate::KILOBYTE)
            .build();
        let evicted = restored.read_from_file(snapshot.path()).unwrap();
        assert!(evicted >= 6);
        assert!(restored.memory_usage() <= 4 * crate::KILOBYTE);
    }

    #[test]
    fn expirations_survive_the_round_trip() {
        let snapshot = TempSnapshot::new("ttl");
        let cache: Cache<String> = Cache::new();
        cache.set_with_ttl("lease", "v".to_string(), Some(Duration::from_secs(3600)));
        cache.set_with_ttl("stale", "v".to_string(), Some(Duration::from_millis(1)));
        cache.set("forever", "v".to_string());
        sleep(Duration::from_millis(5));
        cache.save_to_file(snapshot.path()).unwrap();

        let restored: Cache<String> = Cache::new();
        restored.read_from_file(snapshot.path()).unwrap();

        let remaining = restored.ttl("lease").unwrap();
        assert!(remaining > Duration::from_secs(59 * 60));
        assert!(matches!(
            restored.ttl("forever"),
            Err(CacheError::KeyHasNoExpiration)
        ));
        // Expired on disk: loads, then is reaped on first touch.
        assert_eq!(restored.count(), 3);
        assert!(restored.get("stale").is_none());
        assert_eq!(restored.count(), 2);
        assert_eq!(restored.stats().expired_keys, 1);
    }

    #[test]
    fn load_replaces_existing_contents() {
        let snapshot = TempSnapshot::new("replace");
        let source: Cache<String> = Cache::new();
        source.set("from-snapshot", "v".to_string());
        source.save_to_file(snapshot.path()).unwrap();

        let target: Cache<String> = Cache::new();
        target.set("pre-existing", "v".to_string());
        target.read_from_file(snapshot.path()).unwrap();

        assert_eq!(target.count(), 1);
        assert!(target.get("pre-existing").is_none());
        assert!(target.get("from-snapshot").is_some());
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let cache: Cache<String> = Cache::new();
        let result = cache.read_from_file("/nonexistent/stashkit.snapshot");
        assert!(matches!(result, Err(CacheError::Io(_))));
    }

    #[test]
    fn foreign_file_is_a_codec_error() {
        let snapshot = TempSnapshot::new("foreign");
        std::fs::write(snapshot.path(), b"definitely not a snapshot").unwrap();

        let cache: Cache<String> = Cache::new();
        cache.set("untouched", "v".to_string());
        let result = cache.read_from_file(snapshot.path());
        assert!(matches!(result, Err(CacheError::Codec(_))));
        // A failed decode must not disturb the current contents.
        assert_eq!(cache.count(), 1);
    }

    #[test]
    fn empty_cache_round_trips() {
        let snapshot = TempSnapshot::new("empty");
        let cache: Cache<String> = Cache::new();
        cache.save_to_file(snapshot.path()).unwrap();

        let restored: Cache<String> = Cache::new();
        assert_eq!(restored.read_from_file(snapshot.path()).unwrap(), 0);
        assert_eq!(restored.count(), 0);
    }
}

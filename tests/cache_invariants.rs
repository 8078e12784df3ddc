// ==============================================
// CROSS-MODULE INVARIANT TESTS (integration)
// ==============================================
//
// Behavioral guarantees that span the cache facade, the janitor, and the
// snapshot codec, exercised through the public API only.

use std::thread::sleep;
use std::time::Duration;

use stashkit::{Cache, CacheError, EvictionPolicy, NO_MAX_SIZE};

// ==============================================
// Capacity Invariants
// ==============================================
//
// After any sequence of sets, a bounded cache never exceeds its entry or
// byte bound, whatever the policy.

mod capacity {
    use super::*;

    #[test]
    fn entry_bound_holds_under_churn() {
        for policy in [
            EvictionPolicy::FirstInFirstOut,
            EvictionPolicy::LeastRecentlyUsed,
        ] {
            let cache: Cache<u64> = Cache::builder()
                .with_max_size(16)
                .with_eviction_policy(policy)
                .build();
            for i in 0..500u64 {
                cache.set(format!("key-{}", i % 40), i);
                if i % 3 == 0 {
                    cache.get(&format!("key-{}", i % 17));
                }
                if i % 7 == 0 {
                    cache.delete(&format!("key-{}", i % 11));
                }
                assert!(cache.count() <= 16, "count exceeded bound ({policy:?})");
            }
        }
    }

    #[test]
    fn byte_bound_holds_under_churn() {
        let cache: Cache<String> = Cache::builder()
            .with_max_size(NO_MAX_SIZE)
            .with_max_memory_usage(16 * stashkit::KILOBYTE)
            .build();
        for i in 0..200 {
            cache.set(format!("key-{i}"), "x".repeat(1 + (i * 37) % 2048));
            assert!(cache.memory_usage() <= 16 * stashkit::KILOBYTE);
        }
        assert!(cache.count() > 0);
    }

    #[test]
    fn eviction_counter_accounts_for_every_displacement() {
        let cache: Cache<u64> = Cache::builder().with_max_size(10).build();
        for i in 0..100u64 {
            cache.set(i.to_string(), i);
        }
        assert_eq!(cache.count(), 10);
        assert_eq!(cache.stats().evicted_keys, 90);
    }
}

// ==============================================
// Policy Differential
// ==============================================
//
// The same access trace must produce different survivors under FIFO and
// LRU; this is the observable difference between the two policies.

mod policy_differential {
    use super::*;

    fn run_trace(policy: EvictionPolicy) -> (bool, bool) {
        let cache: Cache<&'static str> = Cache::builder()
            .with_max_size(3)
            .with_eviction_policy(policy)
            .build();
        cache.set("1", "v");
        cache.set("2", "v");
        cache.set("3", "v");
        cache.get("1");
        cache.set("4", "v");
        (cache.get("1").is_some(), cache.get("2").is_some())
    }

    #[test]
    fn lru_protects_the_read_key_fifo_does_not() {
        assert_eq!(run_trace(EvictionPolicy::LeastRecentlyUsed), (true, false));
        assert_eq!(run_trace(EvictionPolicy::FirstInFirstOut), (false, true));
    }
}

// ==============================================
// Janitor + Snapshot Interplay
// ==============================================

mod janitor_and_snapshots {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("stashkit-it-{name}-{}.snapshot", std::process::id()))
    }

    #[test]
    fn expired_snapshot_entries_are_reaped_by_the_janitor_after_load() {
        let path = temp_path("reap-after-load");
        let source: Cache<String> = Cache::new();
        source.set("permanent", "v".to_string());
        for i in 0..5 {
            source.set_with_ttl(
                format!("ephemeral-{i}"),
                "v".to_string(),
                Some(Duration::from_millis(1)),
            );
        }
        sleep(Duration::from_millis(5));
        source.save_to_file(&path).unwrap();

        let restored: Cache<String> = Cache::new();
        restored.read_from_file(&path).unwrap();
        assert_eq!(restored.count(), 6);

        restored.start_janitor().unwrap();
        let deadline = std::time::Instant::now() + Duration::from_millis(500);
        while restored.count() > 1 && std::time::Instant::now() < deadline {
            sleep(Duration::from_millis(10));
        }
        restored.stop_janitor();

        assert_eq!(restored.count(), 1);
        assert_eq!(restored.stats().expired_keys, 5);
        assert!(restored.get("permanent").is_some());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn snapshot_taken_while_janitor_runs_is_consistent() {
        let path = temp_path("save-under-janitor");
        let cache: Cache<String> = Cache::new();
        cache.start_janitor().unwrap();
        for i in 0..50 {
            cache.set(format!("key-{i}"), format!("value-{i}"));
        }
        cache.save_to_file(&path).unwrap();
        cache.stop_janitor();

        let restored: Cache<String> = Cache::new();
        restored.read_from_file(&path).unwrap();
        assert_eq!(restored.count(), 50);
        assert_eq!(
            restored.get("key-17").as_deref(),
            Some(&"value-17".to_string())
        );
        let _ = std::fs::remove_file(&path);
    }
}

// ==============================================
// Observational Expiry
// ==============================================
//
// Between the deadline passing and the reap, an expired key must already be
// invisible to every read path.

mod observational_expiry {
    use super::*;

    #[test]
    fn expired_key_is_invisible_everywhere_before_reaping() {
        let cache: Cache<String> = Cache::new();
        cache.set_with_ttl("ghost", "v".to_string(), Some(Duration::from_millis(1)));
        sleep(Duration::from_millis(5));

        // Still physically present...
        assert_eq!(cache.count(), 1);
        // ...but observationally gone on every surface.
        assert!(cache.get_keys_by_pattern("*", 0).is_empty());
        assert!(cache.get_all().is_empty());
        assert!(matches!(
            cache.ttl("ghost"),
            Err(CacheError::KeyDoesNotExist)
        ));
        assert!(!cache.expire("ghost", Some(Duration::from_secs(60))));
        // The first get reaps it for real.
        assert!(cache.get("ghost").is_none());
        assert_eq!(cache.count(), 0);
    }
}

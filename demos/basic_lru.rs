use stashkit::{Cache, EvictionPolicy};

fn main() {
    let cache: Cache<String> = Cache::builder()
        .with_max_size(2)
        .with_eviction_policy(EvictionPolicy::LeastRecentlyUsed)
        .build();

    cache.set("1", "alpha".to_string());
    cache.set("2", "beta".to_string());

    if let Some(value) = cache.get("1") {
        println!("hit 1: {value}");
    }

    cache.set("3", "gamma".to_string());

    println!("still has 1? {}", cache.get("1").is_some());
    println!("still has 2? {}", cache.get("2").is_some());
}

// Expected output:
// hit 1: alpha
// still has 1? true
// still has 2? false
//
// Explanation: capacity=2; after get("1"), key 1 is at the head and key 2
// is the tail. Inserting key 3 evicts key 2.

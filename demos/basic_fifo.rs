use stashkit::Cache;

fn main() {
    let cache: Cache<String> = Cache::builder().with_max_size(2).build();

    cache.set("1", "alpha".to_string());
    cache.set("2", "beta".to_string());

    if let Some(value) = cache.get("1") {
        println!("hit 1: {value}");
    }

    cache.set("3", "gamma".to_string());

    println!("still has 1? {}", cache.get("1").is_some());
    println!("evicted so far: {}", cache.stats().evicted_keys);
}

// Expected output:
// hit 1: alpha
// still has 1? false
// evicted so far: 1
//
// Explanation: FIFO ignores the read of key 1; it is still the oldest
// insertion, so adding key 3 evicts it.

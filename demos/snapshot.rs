use std::time::Duration;

use stashkit::Cache;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::temp_dir().join("stashkit-demo.snapshot");

    let cache: Cache<String> = Cache::new();
    cache.set("motd", "hello from yesterday".to_string());
    cache.set_with_ttl(
        "session",
        "expires in an hour".to_string(),
        Some(Duration::from_secs(3600)),
    );
    cache.save_to_file(&path)?;
    println!("saved {} entries", cache.count());

    let restored: Cache<String> = Cache::new();
    let evicted = restored.read_from_file(&path)?;
    println!("restored {} entries ({evicted} evicted)", restored.count());
    println!("motd: {}", restored.get("motd").unwrap());
    println!("session ttl: {:?}", restored.ttl("session")?);

    std::fs::remove_file(&path)?;
    Ok(())
}

//! Environment-driven cache server.
//!
//! Reads its configuration from the environment and serves the RESP
//! front-end until interrupted:
//!
//! - `PORT` — listening port (default: 6379)
//! - `MAX_CACHE_SIZE` — entry bound, 0 = unbounded (default: 1000)
//! - `MAX_MEMORY_USAGE` — byte bound, 0 = unbounded (default: unbounded)
//! - `AUTOSAVE` — snapshot interval in seconds, 0 = off (default: off)
//! - `AUTOSAVE_FILE` — snapshot path (default: stashkit.snapshot)
//! - `RUST_LOG` — tracing filter (default: info)

use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use stashkit::server::{Server, DEFAULT_SERVER_PORT};
use stashkit::{Cache, EvictionPolicy};

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let port: u16 = env_or("PORT", DEFAULT_SERVER_PORT);
    let max_size: usize = env_or("MAX_CACHE_SIZE", stashkit::DEFAULT_MAX_SIZE);
    let max_memory_usage: usize = env_or("MAX_MEMORY_USAGE", stashkit::NO_MAX_MEMORY_USAGE);
    let autosave_seconds: u64 = env_or("AUTOSAVE", 0);
    let autosave_file = env::var("AUTOSAVE_FILE").unwrap_or_else(|_| "stashkit.snapshot".to_string());

    let cache: Cache<Vec<u8>> = Cache::builder()
        .with_max_size(max_size)
        .with_max_memory_usage(max_memory_usage)
        .with_eviction_policy(EvictionPolicy::LeastRecentlyUsed)
        .build();
    info!(
        max_size,
        max_memory_usage,
        policy = ?cache.eviction_policy(),
        "cache configured"
    );

    let mut server = Server::new(cache.clone()).with_port(port);
    if autosave_seconds > 0 {
        match cache.read_from_file(&autosave_file) {
            Ok(evicted) => info!(
                entries = cache.count(),
                evicted, "restored previous snapshot"
            ),
            Err(error) => warn!(%error, "starting with an empty cache"),
        }
        server = server.with_autosave(Duration::from_secs(autosave_seconds), &autosave_file);
    }

    server.run().await?;
    Ok(())
}

//! RESP-style TCP front-end (feature = "server").
//!
//! Thin glue over the core cache: the server owns no state beyond the
//! listening socket, a connection counter, and the autosave schedule. Each
//! connection gets one task that reads commands, dispatches them against
//! the shared [`Cache<Vec<u8>>`], and writes replies back; pipelined
//! commands are answered in order within one write.
//!
//! ```text
//!   redis-cli ──► TcpListener ──► connection task ──► commands::execute
//!                                      │                      │
//!                                      ▼                      ▼
//!                                 resp codec  ◄──────  Cache<Vec<u8>>
//!                                                       ▲         ▲
//!                                           janitor ────┘         │
//!                                           autosave task ────────┘
//! ```
//!
//! The janitor starts with the server and stops with it. Autosave, when
//! configured, snapshots the cache on an interval and once more during
//! shutdown; a failed interval save is logged and the loop keeps going.

mod commands;
pub mod resp;

use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::{Cache, CacheError};

use self::commands::Action;
use self::resp::Reply;

/// Same default port as the protocol this front-end mimics.
pub const DEFAULT_SERVER_PORT: u16 = 6379;

/// Shared per-server state handed to every connection task.
pub(crate) struct ServerState {
    pub(crate) cache: Cache<Vec<u8>>,
    pub(crate) start_time: Instant,
    pub(crate) connections: AtomicUsize,
}

/// A cache server: one [`Cache<Vec<u8>>`] behind a RESP TCP listener.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use stashkit::server::Server;
/// use stashkit::Cache;
///
/// #[tokio::main]
/// async fn main() {
///     let cache = Cache::builder().with_max_size(100_000).build();
///     Server::new(cache)
///         .with_port(6379)
///         .with_autosave(Duration::from_secs(10), "stashkit.snapshot")
///         .run()
///         .await
///         .unwrap();
/// }
/// ```
pub struct Server {
    cache: Cache<Vec<u8>>,
    port: u16,
    autosave: Option<(Duration, PathBuf)>,
}

impl Server {
    pub fn new(cache: Cache<Vec<u8>>) -> Self {
        Server {
            cache,
            port: DEFAULT_SERVER_PORT,
            autosave: None,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Snapshots the cache to `path` every `interval`, and once more on
    /// shutdown.
    pub fn with_autosave(mut self, interval: Duration, path: impl Into<PathBuf>) -> Self {
        self.autosave = Some((interval, path.into()));
        self
    }

    /// Runs until ctrl-c. Starts the janitor and (if configured) the
    /// autosave task, accepts connections, and on shutdown stops the
    /// janitor and flushes a final snapshot.
    pub async fn run(self) -> Result<(), CacheError> {
        self.cache.start_janitor()?;

        let state = Arc::new(ServerState {
            cache: self.cache.clone(),
            start_time: Instant::now(),
            connections: AtomicUsize::new(0),
        });

        let autosave_task = self.autosave.clone().map(|(interval, path)| {
            let cache = self.cache.clone();
            tokio::spawn(autosave_loop(cache, interval, path))
        });

        let listener = TcpListener::bind(("0.0.0.0", self.port)).await?;
        info!(port = self.port, "listening");

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, addr) = accepted?;
                    let state = Arc::clone(&state);
                    tokio::spawn(async move {
                        state.connections.fetch_add(1, Ordering::Relaxed);
                        if let Err(error) = handle_connection(stream, &state).await {
                            debug!(%addr, %error, "connection ended with error");
                        }
                        state.connections.fetch_sub(1, Ordering::Relaxed);
                    });
                },
                _ = tokio::signal::ctrl_c() => {
                    info!("shutting down");
                    break;
                },
            }
        }

        if let Some(task) = autosave_task {
            task.abort();
        }
        self.cache.stop_janitor();
        if let Some((_, path)) = &self.autosave {
            info!(path = %path.display(), "saving snapshot before exit");
            let start = Instant::now();
            self.cache.save_to_file(path)?;
            info!(elapsed = ?start.elapsed(), "snapshot saved");
        }
        Ok(())
    }
}

async fn autosave_loop(cache: Cache<Vec<u8>>, interval: Duration, path: PathBuf) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick fires immediately; the cache is still empty then.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let cache = cache.clone();
        let path = path.clone();
        let saved = tokio::task::spawn_blocking(move || cache.save_to_file(&path)).await;
        match saved {
            Ok(Ok(())) => debug!("autosave complete"),
            Ok(Err(error)) => warn!(%error, "autosave failed"),
            Err(error) => warn!(%error, "autosave task panicked"),
        }
    }
}

async fn handle_connection(mut stream: TcpStream, state: &ServerState) -> io::Result<()> {
    let mut input = BytesMut::with_capacity(4096);
    let mut output = BytesMut::with_capacity(4096);
    loop {
        loop {
            match resp::parse_command(&mut input) {
                Ok(Some(args)) => {
                    if args.is_empty() {
                        continue;
                    }
                    let (reply, action) = commands::execute(state, &args);
                    resp::write_reply(&mut output, &reply);
                    if action == Action::Close {
                        stream.write_all(&output).await?;
                        return Ok(());
                    }
                },
                Ok(None) => break,
                Err(error) => {
                    let reply = Reply::Error(format!("ERR protocol error: {error}"));
                    resp::write_reply(&mut output, &reply);
                    stream.write_all(&output).await?;
                    return Ok(());
                },
            }
        }
        if !output.is_empty() {
            stream.write_all(&output).await?;
            output.clear();
        }
        if stream.read_buf(&mut input).await? == 0 {
            return Ok(());
        }
    }
}

//! Background expiration.
//!
//! The janitor is one owned thread per cache, opt-in via
//! [`Cache::start_janitor`]. Without it, expired entries are reclaimed only
//! lazily when `get` touches them.
//!
//! ## Shift model
//!
//! The thread alternates between sleeping and performing one *shift*: a
//! bounded tail-to-head walk of the ordering list under the write lock,
//! deleting expired entries as it goes. A shift ends when it reaches the
//! head, visits [`JANITOR_MAX_ITERATIONS_PER_SHIFT`] nodes, or reaps
//! [`JANITOR_SHIFT_TARGET`] entries, whichever comes first, so a single
//! shift can never stall readers for long.
//!
//! Rather than restarting at the tail every time, a shift records where it
//! stopped and resumes there, provided the recorded key still maps to the
//! very same node (a delete or re-insert in between invalidates the resume
//! point). Reaching the head completes a sweep and the next shift restarts
//! at the tail.
//!
//! ## Back-off
//!
//! A shift that reaped anything resets the sleep to
//! [`JANITOR_MIN_SHIFT_BACKOFF`]; an empty shift doubles it, capped at
//! [`JANITOR_MAX_SHIFT_BACKOFF`]. An idle cache costs two lock
//! acquisitions per second; a cache shedding a TTL wave is swept every 50ms.
//!
//! ## Lifecycle
//!
//! At most one janitor per cache: a second [`Cache::start_janitor`] returns
//! [`CacheError::JanitorAlreadyRunning`]. [`Cache::stop_janitor`] signals the
//! thread and joins it. The thread also exits on its own once every handle
//! to the cache is gone (its weak reference stops upgrading), so an
//! un-stopped janitor cannot keep a dead cache alive.

use std::io;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::RwLock;

use crate::cache::{Cache, CacheCore};
use crate::error::CacheError;

/// Cap on list nodes visited in one shift.
pub const JANITOR_MAX_ITERATIONS_PER_SHIFT: usize = 1000;

/// Expired-entry count at which a shift ends early.
pub const JANITOR_SHIFT_TARGET: usize = 25;

/// Minimum sleep between shifts.
pub const JANITOR_MIN_SHIFT_BACKOFF: Duration = Duration::from_millis(50);

/// Maximum sleep between shifts.
pub const JANITOR_MAX_SHIFT_BACKOFF: Duration = Duration::from_millis(500);

/// Running janitor thread plus its stop signal.
pub(crate) struct JanitorHandle {
    stop_tx: mpsc::Sender<()>,
    thread: JoinHandle<()>,
}

impl JanitorHandle {
    /// Signals the thread and waits for it to exit. The thread is always
    /// either sleeping on the channel or inside a bounded shift, so the join
    /// is prompt.
    pub(crate) fn stop(self) {
        let _ = self.stop_tx.send(());
        let _ = self.thread.join();
    }
}

pub(crate) fn spawn<V: Send + Sync + 'static>(
    core: Weak<RwLock<CacheCore<V>>>,
) -> io::Result<JanitorHandle> {
    let (stop_tx, stop_rx) = mpsc::channel();
    let thread = thread::Builder::new()
        .name("stashkit-janitor".to_string())
        .spawn(move || run(core, stop_rx))?;
    Ok(JanitorHandle { stop_tx, thread })
}

fn run<V: Send + Sync>(core: Weak<RwLock<CacheCore<V>>>, stop_rx: mpsc::Receiver<()>) {
    let mut backoff = JANITOR_MIN_SHIFT_BACKOFF;
    loop {
        match stop_rx.recv_timeout(backoff) {
            // Disconnection means the cache dropped its handle without
            // stopping us first; either way, shut down.
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
            Err(RecvTimeoutError::Timeout) => {
                let Some(core) = core.upgrade() else { return };
                let expired = core.write().sweep_shift();
                backoff = if expired > 0 {
                    JANITOR_MIN_SHIFT_BACKOFF
                } else {
                    (backoff * 2).min(JANITOR_MAX_SHIFT_BACKOFF)
                };
            },
        }
    }
}

impl<V> CacheCore<V> {
    /// One bounded tail-to-head pass; returns how many entries it reaped.
    /// Called with the write lock held.
    pub(crate) fn sweep_shift(&mut self) -> usize {
        let Some(tail_ptr) = self.tail else { return 0 };

        let mut current = tail_ptr;
        if let Some((key, recorded)) = self.resume.take() {
            // Resume only if the key still maps to the very same node.
            // Anything else means the node was deleted (possibly replaced
            // by a new entry under the same key) since the last shift, and
            // the recorded pointer must not be trusted.
            if self.entries.get(&key).copied() == Some(recorded) {
                current = recorded;
            }
        }
        if current == tail_ptr {
            tracing::debug!(
                entries = self.entries.len(),
                expired_last_sweep = self.sweep_tally,
                "janitor restarting walk from the tail"
            );
            self.sweep_tally = 0;
        }

        let mut steps = 0usize;
        let mut expired_found = 0usize;
        loop {
            steps += 1;
            let at_head = self.head == Some(current);
            // Cache the successor before a potential delete unlinks the node.
            let (next, is_expired) = {
                let node = unsafe { current.as_ref() };
                (node.next, node.expired())
            };
            if is_expired {
                expired_found += 1;
                self.remove_node(current);
                self.stats.inc_expired();
            }
            if at_head {
                self.resume = None;
                break;
            }
            let Some(next_ptr) = next else {
                // The walk ran off the list; treat it as a completed sweep.
                self.resume = None;
                break;
            };
            current = next_ptr;
            if steps >= JANITOR_MAX_ITERATIONS_PER_SHIFT || expired_found >= JANITOR_SHIFT_TARGET {
                let key = unsafe { current.as_ref() }.key.clone();
                self.resume = Some((key, current));
                break;
            }
        }
        self.sweep_tally += expired_found;
        expired_found
    }
}

impl<V: Send + Sync + 'static> Cache<V> {
    /// Starts the background expiration thread.
    ///
    /// # Errors
    ///
    /// [`CacheError::JanitorAlreadyRunning`] if this cache already has one;
    /// [`CacheError::Io`] if the thread cannot be spawned.
    pub fn start_janitor(&self) -> Result<(), CacheError> {
        let mut slot = self.janitor.lock();
        if slot.is_some() {
            return Err(CacheError::JanitorAlreadyRunning);
        }
        *slot = Some(spawn(Arc::downgrade(&self.core))?);
        Ok(())
    }

    /// Stops the janitor and waits for it to exit. A no-op if none is
    /// running.
    pub fn stop_janitor(&self) {
        let handle = self.janitor.lock().take();
        if let Some(handle) = handle {
            handle.stop();
        }
    }
}

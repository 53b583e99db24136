//! Per-GID completion waiter.
//!
//! # Design
//! - `wait` is idempotent per GID: concurrent waiters share one slot and all
//!   observe the same single outcome.
//! - A terminal outcome that arrives before anyone waits is buffered for a
//!   bounded time (and bounded count) so a late `wait` still resolves.
//! - Slots are removed on resolution and when the last waiter gives up, so a
//!   cancelled wait never leaves an entry behind.
//! - A discarded GID drops its buffered outcome, or the next one to arrive
//!   within the buffer window, so removed downloads do not linger.
//! - Resolution never blocks; it runs on the connection's read loop.

use std::collections::{HashMap, VecDeque};
use std::fmt::{self, Display, Formatter};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, trace};

use crate::model::Gid;

/// How long an unclaimed terminal outcome stays claimable.
pub const DEFAULT_BUFFER_TTL: Duration = Duration::from_secs(60);
/// Maximum number of unclaimed outcomes kept at once.
pub const DEFAULT_BUFFER_CAPACITY: usize = 1_024;

/// Terminal outcome of a download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadOutcome {
    /// The download completed.
    Completed,
    /// The download was stopped before completing.
    Stopped,
    /// The download stopped because of an error.
    Errored,
}

impl DownloadOutcome {
    /// Whether the download completed.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl Display for DownloadOutcome {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Completed => "completed",
            Self::Stopped => "stopped",
            Self::Errored => "errored",
        })
    }
}

struct Slot {
    generation: u64,
    outcome: watch::Sender<Option<DownloadOutcome>>,
}

struct Buffered {
    outcome: DownloadOutcome,
    at: Instant,
}

#[derive(Default)]
struct State {
    closed: bool,
    next_generation: u64,
    waiting: HashMap<Gid, Slot>,
    buffered: HashMap<Gid, Buffered>,
    arrival: VecDeque<(Instant, Gid)>,
    discarded: HashMap<Gid, Instant>,
}

impl State {
    fn evict(&mut self, now: Instant, ttl: Duration, capacity: usize) {
        self.discarded
            .retain(|_, at| now.saturating_duration_since(*at) < ttl);
        while let Some((at, gid)) = self.arrival.front().cloned() {
            let expired = now.saturating_duration_since(at) >= ttl;
            let over = self.buffered.len() > capacity;
            if !expired && !over {
                break;
            }
            self.arrival.pop_front();
            if self.buffered.get(&gid).is_some_and(|entry| entry.at == at) {
                self.buffered.remove(&gid);
                trace!(%gid, "evicted unclaimed download outcome");
            }
        }
    }
}

/// Synchronizes callers waiting on a download with the daemon's terminal
/// notifications.
pub struct CompletionWaiter {
    state: Mutex<State>,
    buffer_ttl: Duration,
    buffer_capacity: usize,
}

impl Default for CompletionWaiter {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionWaiter {
    /// Waiter with the default late-arrival buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::with_buffer(DEFAULT_BUFFER_TTL, DEFAULT_BUFFER_CAPACITY)
    }

    /// Waiter that keeps at most `capacity` unclaimed outcomes, each for at
    /// most `ttl`.
    #[must_use]
    pub fn with_buffer(ttl: Duration, capacity: usize) -> Self {
        Self {
            state: Mutex::new(State::default()),
            buffer_ttl: ttl,
            buffer_capacity: capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until `gid` reaches a terminal state.
    ///
    /// Returns `None` if the waiter is closed before an outcome arrives.
    pub async fn wait(&self, gid: &Gid) -> Option<DownloadOutcome> {
        let mut registration = {
            let mut state = self.lock();
            state.evict(Instant::now(), self.buffer_ttl, self.buffer_capacity);
            if let Some(buffered) = state.buffered.remove(gid) {
                debug!(%gid, outcome = %buffered.outcome, "claimed buffered download outcome");
                return Some(buffered.outcome);
            }
            if state.closed {
                return None;
            }
            let state = &mut *state;
            let generation = state.next_generation;
            let slot = state.waiting.entry(gid.clone()).or_insert_with(|| Slot {
                generation,
                outcome: watch::channel(None).0,
            });
            if slot.generation == generation {
                state.next_generation += 1;
            }
            Registration {
                waiter: self,
                gid: gid.clone(),
                generation: slot.generation,
                outcome: slot.outcome.subscribe(),
            }
        };

        loop {
            if let Some(outcome) = *registration.outcome.borrow_and_update() {
                return Some(outcome);
            }
            if registration.outcome.changed().await.is_err() {
                return *registration.outcome.borrow();
            }
        }
    }

    /// Deliver `outcome` for `gid`. Returns whether a waiter was present;
    /// otherwise the outcome is buffered unless one is already held.
    pub fn resolve(&self, gid: &Gid, outcome: DownloadOutcome) -> bool {
        let mut state = self.lock();
        if let Some(slot) = state.waiting.remove(gid) {
            slot.outcome.send_replace(Some(outcome));
            return true;
        }
        if state.closed {
            return false;
        }
        if state.discarded.remove(gid).is_some() {
            trace!(%gid, %outcome, "dropped outcome of discarded download");
            return false;
        }
        let now = Instant::now();
        if !state.buffered.contains_key(gid) {
            state
                .buffered
                .insert(gid.clone(), Buffered { outcome, at: now });
            state.arrival.push_back((now, gid.clone()));
        }
        state.evict(now, self.buffer_ttl, self.buffer_capacity);
        false
    }

    /// Drop the buffered outcome for `gid`, or the next one delivered while
    /// nobody waits on it.
    pub fn discard(&self, gid: &Gid) {
        let mut state = self.lock();
        if state.closed || state.buffered.remove(gid).is_some() {
            return;
        }
        let now = Instant::now();
        state.discarded.insert(gid.clone(), now);
        state.evict(now, self.buffer_ttl, self.buffer_capacity);
    }

    /// Wake every waiter with no outcome and refuse new waits.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        state.waiting.clear();
        state.buffered.clear();
        state.arrival.clear();
        state.discarded.clear();
    }

    /// Number of GIDs with at least one active waiter.
    #[must_use]
    pub fn waiting_len(&self) -> usize {
        self.lock().waiting.len()
    }

    /// Number of unclaimed buffered outcomes.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.lock().buffered.len()
    }
}

/// Releases a wait slot when its last waiter is dropped unresolved.
struct Registration<'a> {
    waiter: &'a CompletionWaiter,
    gid: Gid,
    generation: u64,
    outcome: watch::Receiver<Option<DownloadOutcome>>,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        let mut state = self.waiter.lock();
        let abandoned = state.waiting.get(&self.gid).is_some_and(|slot| {
            slot.generation == self.generation && slot.outcome.receiver_count() <= 1
        });
        if abandoned {
            state.waiting.remove(&self.gid);
            trace!(gid = %self.gid, "released abandoned wait slot");
        }
    }
}

//! Push-event categories and the listener registry.
//!
//! # Design
//! - Listeners are grouped per category and invoked in registration order.
//! - A panicking listener is contained; the remaining listeners still run.
//! - Every event is also published on a broadcast channel for consumers that
//!   want the whole stream instead of one category.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::warn;

use crate::model::{DownloadEvent, Gid};
use crate::waiter::DownloadOutcome;

const DEFAULT_BROADCAST_CAPACITY: usize = 256;

/// Notification categories pushed by the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A download started.
    Start,
    /// A download was paused.
    Pause,
    /// A download was stopped by the user.
    Stop,
    /// A download completed.
    Complete,
    /// A download stopped because of an error.
    Error,
    /// A torrent finished downloading but may still be seeding.
    BtComplete,
}

impl EventKind {
    /// Every category, in daemon documentation order.
    pub const ALL: [Self; 6] = [
        Self::Start,
        Self::Pause,
        Self::Stop,
        Self::Complete,
        Self::Error,
        Self::BtComplete,
    ];

    /// Notification method carrying this category.
    #[must_use]
    pub const fn method(self) -> &'static str {
        match self {
            Self::Start => "aria2.onDownloadStart",
            Self::Pause => "aria2.onDownloadPause",
            Self::Stop => "aria2.onDownloadStop",
            Self::Complete => "aria2.onDownloadComplete",
            Self::Error => "aria2.onDownloadError",
            Self::BtComplete => "aria2.onBtDownloadComplete",
        }
    }

    /// Short label used in logs and metrics.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Pause => "pause",
            Self::Stop => "stop",
            Self::Complete => "complete",
            Self::Error => "error",
            Self::BtComplete => "bt_complete",
        }
    }

    /// Outcome this category resolves a waiter with, if it is terminal.
    #[must_use]
    pub const fn terminal_outcome(self) -> Option<DownloadOutcome> {
        match self {
            Self::Stop => Some(DownloadOutcome::Stopped),
            Self::Complete => Some(DownloadOutcome::Completed),
            Self::Error => Some(DownloadOutcome::Errored),
            Self::Start | Self::Pause | Self::BtComplete => None,
        }
    }
}

/// Event as seen on the aggregate stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DaemonEvent {
    /// Category.
    pub kind: EventKind,
    /// Download the event refers to.
    pub gid: Gid,
}

/// Handle returned by [`ListenerRegistry::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&DownloadEvent) + Send + Sync>;

/// Category-keyed table of ordered callbacks.
pub struct ListenerRegistry {
    listeners: RwLock<HashMap<EventKind, Vec<(ListenerId, Listener)>>>,
    next_id: AtomicU64,
    stream: broadcast::Sender<DaemonEvent>,
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ListenerRegistry {
    /// Registry with the default aggregate-stream capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BROADCAST_CAPACITY)
    }

    /// Registry whose aggregate stream buffers `capacity` events per
    /// subscriber before lagging ones skip ahead.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (stream, _) = broadcast::channel(capacity);
        Self {
            listeners: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            stream,
        }
    }

    /// Append `listener` to the callbacks for `kind`.
    ///
    /// Listeners run on the connection's read loop and must return quickly;
    /// long work belongs in a spawned task.
    pub fn subscribe<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&DownloadEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(kind)
            .or_default()
            .push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener. Returns whether it was registered.
    pub fn unsubscribe(&self, kind: EventKind, id: ListenerId) -> bool {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(entries) = listeners.get_mut(&kind) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            listeners.remove(&kind);
        }
        removed
    }

    /// Subscribe to every event regardless of category.
    #[must_use]
    pub fn stream(&self) -> broadcast::Receiver<DaemonEvent> {
        self.stream.subscribe()
    }

    /// Number of listeners registered for `kind`.
    #[must_use]
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .map_or(0, Vec::len)
    }

    /// Invoke every listener for `kind` in registration order, then publish on
    /// the aggregate stream.
    pub fn dispatch(&self, kind: EventKind, event: &DownloadEvent) {
        let snapshot: Vec<Listener> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .map(|entries| entries.iter().map(|(_, listener)| Arc::clone(listener)).collect())
            .unwrap_or_default();

        for listener in snapshot {
            if panic::catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                warn!(kind = kind.label(), gid = %event.gid, "event listener panicked");
            }
        }

        let _ = self.stream.send(DaemonEvent {
            kind,
            gid: event.gid.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn event(gid: &str) -> DownloadEvent {
        DownloadEvent { gid: Gid::new(gid) }
    }

    #[test]
    fn listeners_run_in_registration_order_per_category() {
        let registry = ListenerRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for label in ["first", "second", "third"] {
            let seen = Arc::clone(&seen);
            registry.subscribe(EventKind::Complete, move |event| {
                if let Ok(mut seen) = seen.lock() {
                    seen.push(format!("{label}:{}", event.gid));
                }
            });
        }
        let other = Arc::clone(&seen);
        registry.subscribe(EventKind::Start, move |_| {
            if let Ok(mut seen) = other.lock() {
                seen.push("start".to_string());
            }
        });

        registry.dispatch(EventKind::Complete, &event("g1"));

        let seen = seen.lock().map(|seen| seen.clone()).unwrap_or_default();
        assert_eq!(seen, vec!["first:g1", "second:g1", "third:g1"]);
    }

    #[test]
    fn panicking_listener_does_not_starve_others() {
        let registry = ListenerRegistry::new();
        let hits = Arc::new(AtomicU64::new(0));
        registry.subscribe(EventKind::Error, |_| panic!("listener failure"));
        let counter = Arc::clone(&hits);
        registry.subscribe(EventKind::Error, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        registry.dispatch(EventKind::Error, &event("g2"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_removes_only_the_target() {
        let registry = ListenerRegistry::new();
        let keep = registry.subscribe(EventKind::Pause, |_| {});
        let drop_me = registry.subscribe(EventKind::Pause, |_| {});
        assert_eq!(registry.listener_count(EventKind::Pause), 2);
        assert!(registry.unsubscribe(EventKind::Pause, drop_me));
        assert!(!registry.unsubscribe(EventKind::Pause, drop_me));
        assert_eq!(registry.listener_count(EventKind::Pause), 1);
        assert!(registry.unsubscribe(EventKind::Pause, keep));
        assert_eq!(registry.listener_count(EventKind::Pause), 0);
    }

    #[test]
    fn aggregate_stream_sees_every_category() {
        let registry = ListenerRegistry::new();
        let mut stream = registry.stream();
        registry.dispatch(EventKind::Start, &event("g3"));
        registry.dispatch(EventKind::BtComplete, &event("g3"));

        assert_eq!(
            stream.try_recv().ok(),
            Some(DaemonEvent {
                kind: EventKind::Start,
                gid: Gid::new("g3"),
            })
        );
        assert_eq!(
            stream.try_recv().ok().map(|event| event.kind),
            Some(EventKind::BtComplete)
        );
    }

    #[test]
    fn only_stop_complete_and_error_are_terminal() {
        let terminal: Vec<_> = EventKind::ALL
            .into_iter()
            .filter(|kind| kind.terminal_outcome().is_some())
            .collect();
        assert_eq!(
            terminal,
            vec![EventKind::Stop, EventKind::Complete, EventKind::Error]
        );
        assert_eq!(EventKind::BtComplete.method(), "aria2.onBtDownloadComplete");
    }
}

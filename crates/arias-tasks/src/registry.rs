//! Status lookup for submitted tasks.
//!
//! # Design
//! - Written by the accepting path and the executor, read by status queries;
//!   all access goes through one async `RwLock`.
//! - Finished tasks are kept until a prune evicts entries older than the
//!   retention window, so memory stays bounded on long-running servers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use crate::status::TaskStatus;
use crate::task::{Task, TaskId};

struct Entry {
    task: Arc<dyn Task>,
    finished_at: Option<Instant>,
}

/// Tasks known to the service, keyed by identifier.
#[derive(Default)]
pub struct TaskRegistry {
    entries: RwLock<HashMap<TaskId, Entry>>,
}

impl TaskRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `task`, replacing any earlier task with the same identifier.
    pub async fn insert(&self, task: Arc<dyn Task>) {
        self.entries.write().await.insert(
            task.id(),
            Entry {
                task,
                finished_at: None,
            },
        );
    }

    /// Status snapshot of a tracked task.
    pub async fn status(&self, id: TaskId) -> Option<TaskStatus> {
        self.entries
            .read()
            .await
            .get(&id)
            .map(|entry| entry.task.status())
    }

    /// Start the retention clock for `id`.
    pub async fn mark_finished(&self, id: TaskId) {
        self.mark_finished_at(id, Instant::now()).await;
    }

    async fn mark_finished_at(&self, id: TaskId, at: Instant) {
        if let Some(entry) = self.entries.write().await.get_mut(&id) {
            entry.finished_at.get_or_insert(at);
        }
    }

    /// Evict tasks that finished more than `retention` ago. Returns how many
    /// were evicted.
    pub async fn prune(&self, retention: Duration) -> usize {
        self.prune_at(retention, Instant::now()).await
    }

    async fn prune_at(&self, retention: Duration, now: Instant) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| {
            entry
                .finished_at
                .is_none_or(|finished| now.saturating_duration_since(finished) < retention)
        });
        before - entries.len()
    }

    /// Number of tracked tasks.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether no tasks are tracked.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

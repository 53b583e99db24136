//! Concurrency-limited task runner.
//!
//! # Design
//! - Every submitted task is registered before it is spawned, so a status
//!   query issued right after `submit` always finds it.
//! - A semaphore bounds how many tasks run at once; the rest stay `waiting`.
//! - Shutdown cancels the shared token, which each task observes through a
//!   child token, and then waits for every spawned task to return.

use std::sync::Arc;
use std::time::Duration;

use arias_telemetry::Metrics;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use crate::error::{TaskError, TaskResult};
use crate::registry::TaskRegistry;
use crate::status::TaskStatus;
use crate::task::{Task, TaskId};

const MIN_PRUNE_INTERVAL: Duration = Duration::from_millis(10);

/// Executor limits and retention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorSettings {
    /// Tasks allowed to run at once.
    pub max_concurrent: usize,
    /// How long finished task statuses remain queryable.
    pub retention: Duration,
    /// How often expired statuses are evicted.
    pub prune_interval: Duration,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            retention: Duration::from_secs(3_600),
            prune_interval: Duration::from_secs(60),
        }
    }
}

struct Inner {
    registry: TaskRegistry,
    permits: Semaphore,
    metrics: Metrics,
    settings: ExecutorSettings,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

/// Runs submitted tasks in the background and answers status queries.
#[derive(Clone)]
pub struct TaskExecutor {
    inner: Arc<Inner>,
}

impl TaskExecutor {
    /// Executor with the given limits, reporting into `metrics`.
    #[must_use]
    pub fn new(settings: ExecutorSettings, metrics: Metrics) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry: TaskRegistry::new(),
                permits: Semaphore::new(settings.max_concurrent.max(1)),
                metrics,
                settings,
                shutdown: CancellationToken::new(),
                tracker: TaskTracker::new(),
            }),
        }
    }

    /// Register `task` and schedule it.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::ShuttingDown`] once [`TaskExecutor::shutdown`]
    /// has been called.
    pub async fn submit(&self, task: Arc<dyn Task>) -> TaskResult<TaskId> {
        if self.inner.shutdown.is_cancelled() {
            return Err(TaskError::ShuttingDown);
        }
        let id = task.id();
        self.inner.registry.insert(Arc::clone(&task)).await;
        self.inner.metrics.inc_task_submitted();
        self.inner.metrics.add_queued_tasks(1);
        self.inner.record_tracked().await;

        let inner = Arc::clone(&self.inner);
        self.inner.tracker.spawn(async move {
            inner.execute(task).await;
        });
        debug!(task_id = %id, "task submitted");
        Ok(id)
    }

    /// Status snapshot of a tracked task.
    pub async fn status(&self, id: TaskId) -> Option<TaskStatus> {
        self.inner.registry.status(id).await
    }

    /// Tracked tasks.
    #[must_use]
    pub fn registry(&self) -> &TaskRegistry {
        &self.inner.registry
    }

    /// Start the periodic eviction of expired task statuses. The loop ends on
    /// shutdown.
    #[must_use]
    pub fn spawn_pruner(&self) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(inner.settings.prune_interval.max(MIN_PRUNE_INTERVAL));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = inner.shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let evicted = inner.registry.prune(inner.settings.retention).await;
                if evicted > 0 {
                    debug!(evicted, "evicted expired task statuses");
                }
                inner.record_tracked().await;
            }
        })
    }

    /// Whether shutdown has begun.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Stop accepting tasks, cancel running ones and wait for all of them to
    /// return.
    pub async fn shutdown(&self) {
        info!(
            active = self.inner.tracker.len(),
            "task executor shutting down"
        );
        self.inner.shutdown.cancel();
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
    }
}

impl Inner {
    async fn execute(&self, task: Arc<dyn Task>) {
        let id = task.id();
        let permit = self.permits.acquire().await.ok();
        self.metrics.add_queued_tasks(-1);
        self.metrics.add_active_tasks(1);

        if let Err(err) = task.run(self.shutdown.child_token()).await {
            debug!(task_id = %id, error = %err, "task returned an error");
        }

        self.metrics.add_active_tasks(-1);
        drop(permit);
        self.metrics
            .inc_task_finished(task.status().state.as_str());
        self.registry.mark_finished(id).await;
    }

    async fn record_tracked(&self) {
        let tracked = self.registry.len().await;
        self.metrics
            .set_tracked_tasks(i64::try_from(tracked).unwrap_or(i64::MAX));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::TaskState;
    use arias_storage::UploadOutput;
    use async_trait::async_trait;
    use std::sync::{Mutex, PoisonError};
    use tokio::time::timeout;
    use uuid::Uuid;

    const WAIT: Duration = Duration::from_secs(5);

    struct GatedTask {
        id: TaskId,
        status: Mutex<TaskStatus>,
        release: CancellationToken,
    }

    impl GatedTask {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                id: Uuid::new_v4(),
                status: Mutex::new(TaskStatus::new()),
                release: CancellationToken::new(),
            })
        }

        fn update(&self, apply: impl FnOnce(&mut TaskStatus)) {
            apply(&mut self.status.lock().unwrap_or_else(PoisonError::into_inner));
        }
    }

    #[async_trait]
    impl Task for GatedTask {
        fn id(&self) -> TaskId {
            self.id
        }

        fn status(&self) -> TaskStatus {
            self.status
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        async fn run(&self, cancel: CancellationToken) -> TaskResult<()> {
            self.update(TaskStatus::start);
            tokio::select! {
                () = self.release.cancelled() => {
                    self.update(|status| status.finish(UploadOutput {
                        bucket: "b".to_string(),
                        key: "k".to_string(),
                        size_bytes: 0,
                        content_type: "text/plain".to_string(),
                        compressed: false,
                    }));
                    Ok(())
                }
                () = cancel.cancelled() => {
                    self.update(|status| status.fail("task cancelled"));
                    Err(TaskError::Cancelled)
                }
            }
        }
    }

    async fn state_of(executor: &TaskExecutor, id: TaskId) -> Option<TaskState> {
        executor.status(id).await.map(|status| status.state)
    }

    async fn until_state(executor: &TaskExecutor, id: TaskId, state: TaskState) -> anyhow::Result<()> {
        timeout(WAIT, async {
            while state_of(executor, id).await != Some(state) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await?;
        Ok(())
    }

    fn executor(max_concurrent: usize) -> anyhow::Result<(TaskExecutor, Metrics)> {
        let metrics = Metrics::new()?;
        let settings = ExecutorSettings {
            max_concurrent,
            ..ExecutorSettings::default()
        };
        Ok((TaskExecutor::new(settings, metrics.clone()), metrics))
    }

    #[tokio::test]
    async fn tasks_beyond_the_limit_stay_waiting() -> anyhow::Result<()> {
        let (executor, metrics) = executor(1)?;
        let first = GatedTask::new();
        let second = GatedTask::new();
        executor.submit(first.clone()).await?;
        executor.submit(second.clone()).await?;

        until_state(&executor, first.id, TaskState::Started).await?;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(state_of(&executor, second.id).await, Some(TaskState::Waiting));
        assert_eq!(metrics.snapshot().active_tasks, 1);
        assert_eq!(metrics.snapshot().queued_tasks, 1);

        first.release.cancel();
        until_state(&executor, first.id, TaskState::Done).await?;
        until_state(&executor, second.id, TaskState::Started).await?;
        second.release.cancel();
        until_state(&executor, second.id, TaskState::Done).await?;

        timeout(WAIT, async {
            while metrics.snapshot().active_tasks != 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await?;
        executor.shutdown().await;
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.tasks_submitted_total, 2);
        assert_eq!(snapshot.tracked_tasks, 2);
        assert!(metrics.render()?.contains("tasks_finished_total{outcome=\"done\"} 2"));
        Ok(())
    }

    #[tokio::test]
    async fn shutdown_cancels_running_tasks_and_refuses_new_ones() -> anyhow::Result<()> {
        let (executor, _metrics) = executor(2)?;
        let task = GatedTask::new();
        executor.submit(task.clone()).await?;
        until_state(&executor, task.id, TaskState::Started).await?;

        timeout(WAIT, executor.shutdown()).await?;
        let status = executor
            .status(task.id)
            .await
            .ok_or_else(|| anyhow::anyhow!("task evicted"))?;
        assert_eq!(status.state, TaskState::Error);
        assert_eq!(status.error.as_deref(), Some("task cancelled"));

        assert!(executor.is_shutting_down());
        assert!(matches!(
            executor.submit(GatedTask::new()).await,
            Err(TaskError::ShuttingDown)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn pruner_evicts_finished_tasks_after_retention() -> anyhow::Result<()> {
        let metrics = Metrics::new()?;
        let executor = TaskExecutor::new(
            ExecutorSettings {
                max_concurrent: 1,
                retention: Duration::ZERO,
                prune_interval: Duration::from_millis(10),
            },
            metrics.clone(),
        );
        let pruner = executor.spawn_pruner();

        let task = GatedTask::new();
        task.release.cancel();
        executor.submit(task.clone()).await?;

        timeout(WAIT, async {
            while !executor.registry().is_empty().await {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await?;
        assert_eq!(executor.status(task.id).await, None);

        executor.shutdown().await;
        timeout(WAIT, pruner).await??;
        Ok(())
    }
}

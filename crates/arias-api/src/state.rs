//! Shared state handed to every handler.

use std::sync::Arc;

use arias_aria2::Aria2Client;
use arias_config::RequestPolicy;
use arias_tasks::{DownloadTaskFactory, TaskExecutor};
use arias_telemetry::Metrics;

/// Reports whether the download daemon connection is usable.
pub trait DaemonProbe: Send + Sync {
    /// `true` while the daemon connection is open.
    fn is_connected(&self) -> bool;
}

impl DaemonProbe for Aria2Client {
    fn is_connected(&self) -> bool {
        !self.is_closed()
    }
}

/// Collaborators the HTTP handlers work with.
pub struct ApiState {
    pub(crate) executor: TaskExecutor,
    pub(crate) factory: DownloadTaskFactory,
    pub(crate) policy: RequestPolicy,
    pub(crate) metrics: Metrics,
    pub(crate) daemon: Arc<dyn DaemonProbe>,
}

impl ApiState {
    /// Bundle the handler collaborators.
    #[must_use]
    pub fn new(
        executor: TaskExecutor,
        factory: DownloadTaskFactory,
        policy: RequestPolicy,
        metrics: Metrics,
        daemon: Arc<dyn DaemonProbe>,
    ) -> Self {
        Self {
            executor,
            factory,
            policy,
            metrics,
            daemon,
        }
    }
}

//! Capability implemented by every background job the executor runs.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::TaskResult;
use crate::status::TaskStatus;

/// Locally generated task identifier, independent of any daemon GID.
pub type TaskId = Uuid;

/// A job with an identity, an observable status and a single run.
#[async_trait]
pub trait Task: Send + Sync {
    /// Stable identifier.
    fn id(&self) -> TaskId;

    /// Consistent snapshot of the current status; never blocks on the run.
    fn status(&self) -> TaskStatus;

    /// Run to completion. The outcome is also recorded in the status, so
    /// callers may ignore the returned error.
    async fn run(&self, cancel: CancellationToken) -> TaskResult<()>;
}

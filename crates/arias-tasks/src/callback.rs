//! Best-effort webhook delivery of terminal task statuses.

use std::time::Duration;

use reqwest::Client;
use tracing::{debug, instrument};

use crate::error::{TaskError, TaskResult};
use crate::status::TaskStatus;
use crate::task::TaskId;

/// Header carrying the task identifier on callback requests.
pub const TASK_ID_HEADER: &str = "x-arias-task-id";

/// Default upper bound for one callback request.
pub const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Posts task statuses to caller-supplied URLs.
#[derive(Debug, Clone)]
pub struct CallbackNotifier {
    client: Client,
    timeout: Duration,
}

impl Default for CallbackNotifier {
    fn default() -> Self {
        Self::new(DEFAULT_CALLBACK_TIMEOUT)
    }
}

impl CallbackNotifier {
    /// Notifier whose requests give up after `timeout`.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self::with_client(Client::new(), timeout)
    }

    /// Notifier using a caller-configured client.
    #[must_use]
    pub const fn with_client(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// POST `status` as JSON to `url`. Nothing is retried.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the target answers with a
    /// non-success status.
    #[instrument(name = "task.callback", skip(self, status), fields(state = %status.state))]
    pub async fn notify(&self, url: &str, task_id: TaskId, status: &TaskStatus) -> TaskResult<()> {
        let response = self
            .client
            .post(url)
            .timeout(self.timeout)
            .header(TASK_ID_HEADER, task_id.to_string())
            .json(status)
            .send()
            .await
            .map_err(|source| TaskError::Callback {
                url: url.to_string(),
                source,
            })?;
        let code = response.status();
        if !code.is_success() {
            return Err(TaskError::CallbackRejected {
                url: url.to_string(),
                status: code.as_u16(),
            });
        }
        debug!(status = code.as_u16(), "callback delivered");
        Ok(())
    }
}

//! Task state machine.
//!
//! `waiting → started → downloading → uploading → done`, with `error`
//! absorbing failures from `downloading` or `uploading`. Once a status is
//! terminal every further transition is ignored.

use std::fmt::{self, Display, Formatter};

use arias_storage::UploadOutput;
use serde::Serialize;

/// Lifecycle stage of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// Accepted, not yet running.
    Waiting,
    /// Picked up by a worker.
    Started,
    /// Waiting on the daemon.
    Downloading,
    /// Streaming the file into storage.
    Uploading,
    /// Stored successfully.
    Done,
    /// Failed; see the status error.
    Error,
}

impl TaskState {
    /// Whether no further transitions can occur.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }

    /// Lowercase name as exposed over HTTP.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Started => "started",
            Self::Downloading => "downloading",
            Self::Uploading => "uploading",
            Self::Done => "done",
            Self::Error => "error",
        }
    }
}

impl Display for TaskState {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Snapshot of a task's progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskStatus {
    /// Whether a worker is executing the task.
    pub running: bool,
    /// Current stage.
    pub state: TaskState,
    /// Stored object, once the task is done.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<UploadOutput>,
    /// Failure message, once the task has failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskStatus {
    /// Fresh status in `waiting`.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            running: false,
            state: TaskState::Waiting,
            result: None,
            error: None,
        }
    }

    /// Mark the task as picked up by a worker.
    pub fn start(&mut self) {
        if self.state == TaskState::Waiting {
            self.running = true;
            self.state = TaskState::Started;
        }
    }

    /// Move to an intermediate stage.
    pub fn enter(&mut self, state: TaskState) {
        if !self.state.is_terminal() && !state.is_terminal() {
            self.state = state;
        }
    }

    /// Record a failure.
    pub fn fail(&mut self, message: impl Into<String>) {
        if !self.state.is_terminal() {
            self.running = false;
            self.state = TaskState::Error;
            self.error = Some(message.into());
        }
    }

    /// Record a stored object.
    pub fn finish(&mut self, result: UploadOutput) {
        if !self.state.is_terminal() {
            self.running = false;
            self.state = TaskState::Done;
            self.result = Some(result);
        }
    }

    /// Whether the task has finished, successfully or not.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn output() -> UploadOutput {
        UploadOutput {
            bucket: "media".to_string(),
            key: "a.bin".to_string(),
            size_bytes: 5,
            content_type: "application/octet-stream".to_string(),
            compressed: false,
        }
    }

    #[test]
    fn happy_path_walks_every_stage() {
        let mut status = TaskStatus::new();
        assert_eq!(status.state, TaskState::Waiting);
        assert!(!status.running);

        status.start();
        assert!(status.running);
        assert_eq!(status.state, TaskState::Started);
        status.enter(TaskState::Downloading);
        status.enter(TaskState::Uploading);
        status.finish(output());

        assert!(!status.running);
        assert_eq!(status.state, TaskState::Done);
        assert_eq!(status.result, Some(output()));
        assert_eq!(status.error, None);
    }

    #[test]
    fn error_is_absorbing() {
        let mut status = TaskStatus::new();
        status.start();
        status.enter(TaskState::Downloading);
        status.fail("boom");
        status.enter(TaskState::Uploading);
        status.finish(output());
        status.fail("second");

        assert_eq!(status.state, TaskState::Error);
        assert_eq!(status.error.as_deref(), Some("boom"));
        assert_eq!(status.result, None);
        assert!(!status.running);
    }

    #[test]
    fn enter_refuses_terminal_states() {
        let mut status = TaskStatus::new();
        status.start();
        status.enter(TaskState::Done);
        assert_eq!(status.state, TaskState::Started);
        assert!(status.running);
    }

    #[test]
    fn serialises_with_lowercase_state_and_omits_empty_fields() -> anyhow::Result<()> {
        let mut status = TaskStatus::new();
        assert_eq!(
            serde_json::to_value(&status)?,
            json!({"running": false, "state": "waiting"})
        );

        status.start();
        status.fail("invalid number of files downloaded: 0");
        assert_eq!(
            serde_json::to_value(&status)?,
            json!({
                "running": false,
                "state": "error",
                "error": "invalid number of files downloaded: 0",
            })
        );
        Ok(())
    }
}

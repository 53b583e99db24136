//! # Design
//!
//! - Task failures are recorded in the task status as their display text, so
//!   messages describe the failure rather than just naming it.
//! - Download and storage failures wrap the lower-level error unchanged.

use std::io;
use std::path::PathBuf;

use arias_aria2::Aria2Error;
use arias_storage::StorageError;
use thiserror::Error;

/// Result alias for task execution.
pub type TaskResult<T> = Result<T, TaskError>;

/// Errors produced while running a task.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The daemon side of the task failed or was cancelled.
    #[error("{source}")]
    Download {
        /// Underlying daemon error.
        #[source]
        source: Aria2Error,
    },
    /// A finished download did not produce exactly one file.
    #[error("invalid number of files downloaded: {count}")]
    InvalidFileCount {
        /// Number of files the daemon reported.
        count: usize,
    },
    /// The downloaded file is not on disk.
    #[error("downloaded file missing: {}", .path.display())]
    MissingFile {
        /// Path reported by the daemon.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The downloaded file has no usable file name.
    #[error("downloaded file has no name: {}", .path.display())]
    UnnamedFile {
        /// Path reported by the daemon.
        path: PathBuf,
    },
    /// Opening or reading the downloaded file failed.
    #[error("failed to read downloaded file: {}", .path.display())]
    Io {
        /// Operation that failed.
        operation: &'static str,
        /// File involved.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Storing the file failed.
    #[error("{source}")]
    Upload {
        /// Underlying storage error.
        #[source]
        source: StorageError,
    },
    /// The task was cancelled outside the daemon wait.
    #[error("task cancelled")]
    Cancelled,
    /// Delivering a callback failed.
    #[error("failed to deliver callback")]
    Callback {
        /// Callback target.
        url: String,
        /// Underlying HTTP error.
        #[source]
        source: reqwest::Error,
    },
    /// The callback target answered with a non-success status.
    #[error("callback rejected with status {status}")]
    CallbackRejected {
        /// Callback target.
        url: String,
        /// HTTP status returned.
        status: u16,
    },
    /// The executor is shutting down and accepts no new tasks.
    #[error("task executor is shutting down")]
    ShuttingDown,
}

impl From<Aria2Error> for TaskError {
    fn from(source: Aria2Error) -> Self {
        Self::Download { source }
    }
}

impl From<StorageError> for TaskError {
    fn from(source: StorageError) -> Self {
        Self::Upload { source }
    }
}

impl TaskError {
    pub(crate) fn open(path: PathBuf, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            Self::MissingFile { path, source }
        } else {
            Self::Io {
                operation: "open",
                path,
                source,
            }
        }
    }

    /// Display text followed by each distinct cause, as recorded in task
    /// statuses.
    #[must_use]
    pub fn report(&self) -> String {
        let mut message = self.to_string();
        let mut last = message.clone();
        let mut cause = std::error::Error::source(self);
        while let Some(err) = cause {
            let text = err.to_string();
            if text != last {
                message.push_str(": ");
                message.push_str(&text);
            }
            last = text;
            cause = err.source();
        }
        message
    }

    /// Whether the task ended because it was cancelled.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Cancelled
                | Self::Download {
                    source: Aria2Error::Cancelled { .. },
                }
        )
    }
}

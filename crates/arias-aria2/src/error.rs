//! # Design
//!
//! - Keep cancellation distinct from failure so callers can tell them apart.
//! - Carry the daemon's own error code and message for failed downloads.
//! - Record the GID wherever one exists so cleanup can still target it.

use std::io;
use std::path::PathBuf;

use arias_rpc::RpcError;
use thiserror::Error;

use crate::model::{ExitStatus, Gid};
use crate::waiter::DownloadOutcome;

/// Result alias for daemon operations.
pub type Aria2Result<T> = Result<T, Aria2Error>;

/// Errors produced by the daemon facade.
#[derive(Debug, Error)]
pub enum Aria2Error {
    /// Dialing the daemon failed.
    #[error("failed to connect to download daemon")]
    Connect {
        /// Endpoint that was dialed.
        url: String,
        /// Underlying transport error.
        #[source]
        source: RpcError,
    },
    /// A daemon call failed.
    #[error("{source}")]
    Rpc {
        /// Daemon method that failed.
        method: &'static str,
        /// Underlying RPC error.
        #[source]
        source: RpcError,
    },
    /// Arguments were rejected before reaching the daemon.
    #[error("invalid download input")]
    InvalidInput {
        /// Argument that failed validation.
        field: &'static str,
        /// Static reason for the failure.
        reason: &'static str,
    },
    /// The connection closed while waiting on a download.
    #[error("daemon connection lost while waiting for download")]
    Disconnected {
        /// Download being waited on.
        gid: Gid,
    },
    /// The caller cancelled the download.
    #[error("download cancelled")]
    Cancelled {
        /// Download that was cancelled.
        gid: Gid,
    },
    /// The download reached a terminal state other than completion.
    #[error("{}", failure_message(.outcome, .error_message))]
    DownloadFailed {
        /// Download that failed.
        gid: Gid,
        /// Terminal state reached.
        outcome: DownloadOutcome,
        /// Daemon error code.
        error_code: ExitStatus,
        /// Daemon error message.
        error_message: String,
    },
    /// The download finished but its final status could not be read.
    #[error("failed to query status of download {gid}")]
    Status {
        /// Download whose status was queried.
        gid: Gid,
        /// Underlying RPC error.
        #[source]
        source: RpcError,
    },
    /// Removing a downloaded file from disk failed.
    #[error("failed to delete downloaded file")]
    FileCleanup {
        /// File that could not be deleted.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

fn failure_message(outcome: &DownloadOutcome, error_message: &str) -> String {
    let headline = match outcome {
        DownloadOutcome::Stopped => "download stopped",
        DownloadOutcome::Errored | DownloadOutcome::Completed => "download encountered error",
    };
    if error_message.is_empty() {
        headline.to_string()
    } else {
        format!("{headline}: {error_message}")
    }
}

impl Aria2Error {
    pub(crate) const fn rpc(method: &'static str, source: RpcError) -> Self {
        Self::Rpc { method, source }
    }

    /// Download this error concerns, if one was assigned.
    #[must_use]
    pub const fn gid(&self) -> Option<&Gid> {
        match self {
            Self::Disconnected { gid } | Self::Cancelled { gid } => Some(gid),
            Self::DownloadFailed { gid, .. } | Self::Status { gid, .. } => Some(gid),
            _ => None,
        }
    }

    /// Whether the daemon itself rejected the call, as opposed to the
    /// connection failing.
    #[must_use]
    pub const fn is_remote_rejection(&self) -> bool {
        matches!(
            self,
            Self::Rpc {
                source: RpcError::Remote { .. },
                ..
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn failure_messages_name_outcome_and_daemon_reason() {
        let stopped = Aria2Error::DownloadFailed {
            gid: Gid::new("g"),
            outcome: DownloadOutcome::Stopped,
            error_code: ExitStatus::Success,
            error_message: String::new(),
        };
        assert_eq!(stopped.to_string(), "download stopped");

        let errored = Aria2Error::DownloadFailed {
            gid: Gid::new("g"),
            outcome: DownloadOutcome::Errored,
            error_code: ExitStatus::ResourceNotFound,
            error_message: "Resource not found".to_string(),
        };
        assert_eq!(
            errored.to_string(),
            "download encountered error: Resource not found"
        );
        assert_eq!(errored.gid(), Some(&Gid::new("g")));
    }

    #[test]
    fn rpc_errors_pass_remote_messages_through() {
        let err = Aria2Error::rpc(
            "aria2.remove",
            RpcError::Remote {
                method: "aria2.remove".to_string(),
                code: 1,
                message: "Active Download not found for GID#g".to_string(),
            },
        );
        assert!(err.is_remote_rejection());
        assert!(err.to_string().contains("Active Download not found"));
        assert!(err.source().is_some());
        assert!(err.gid().is_none());

        let status = Aria2Error::Status {
            gid: Gid::new("s"),
            source: RpcError::ConnectionClosed,
        };
        assert_eq!(status.gid(), Some(&Gid::new("s")));
        assert!(!status.is_remote_rejection());

        let closed = Aria2Error::rpc("aria2.remove", RpcError::ConnectionClosed);
        assert!(!closed.is_remote_rejection());
        assert_eq!(
            Aria2Error::Cancelled { gid: Gid::new("c") }.to_string(),
            "download cancelled"
        );
    }
}

//! # Design
//!
//! - Constant messages; the object, path, or URL lives in context fields.
//! - Backend errors keep their source so callers can report them unchanged.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors produced while uploading an object.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Upload arguments failed validation.
    #[error("invalid upload input")]
    InvalidInput {
        /// Field that failed validation.
        field: &'static str,
        /// Static reason for the failure.
        reason: &'static str,
        /// Offending value when available.
        value: Option<String>,
    },
    /// Reading the source or writing the destination failed.
    #[error("storage io failure")]
    Io {
        /// Operation that triggered the failure.
        operation: &'static str,
        /// Path involved, if any.
        path: Option<PathBuf>,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Object metadata could not be encoded or decoded.
    #[error("storage metadata failure")]
    Metadata {
        /// Operation that triggered the failure.
        operation: &'static str,
        /// Metadata file involved.
        path: PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
    /// The object store could not be reached.
    #[error("object store request failed")]
    Request {
        /// Operation that triggered the failure.
        operation: &'static str,
        /// Request URL.
        url: String,
        /// Underlying HTTP client error.
        #[source]
        source: reqwest::Error,
    },
    /// The object store answered with a failure status.
    #[error("object store rejected request with status {status}")]
    Rejected {
        /// Operation that was rejected.
        operation: &'static str,
        /// Request URL.
        url: String,
        /// HTTP status code returned.
        status: u16,
    },
}

impl StorageError {
    pub(crate) const fn io(operation: &'static str, path: Option<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path,
            source,
        }
    }

    pub(crate) fn request(
        operation: &'static str,
        url: impl Into<String>,
        source: reqwest::Error,
    ) -> Self {
        Self::Request {
            operation,
            url: url.into(),
            source,
        }
    }
}

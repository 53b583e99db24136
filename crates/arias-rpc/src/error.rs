//! # Design
//!
//! - Separate connection loss from remote faults so callers can tell a dead
//!   link from a rejected request.
//! - Keep transport messages constant; carry the failing operation in fields.
//! - Surface remote fault codes and messages verbatim.

use std::error::Error;

use thiserror::Error;

/// Result alias for RPC operations.
pub type RpcResult<T> = Result<T, RpcError>;

/// Errors raised by the correlation client and its transports.
#[derive(Debug, Error)]
pub enum RpcError {
    /// The connection is closed; no response will arrive.
    #[error("rpc connection closed")]
    ConnectionClosed,
    /// The underlying transport failed while reading or writing a frame.
    #[error("rpc transport failure")]
    Transport {
        /// Transport operation that failed.
        operation: &'static str,
        /// Underlying transport error.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// Request parameters could not be encoded as JSON.
    #[error("rpc request encode failure")]
    Encode {
        /// Method being invoked.
        method: String,
        /// Underlying serde error.
        #[source]
        source: serde_json::Error,
    },
    /// A response payload did not match the expected shape.
    #[error("rpc response decode failure")]
    Decode {
        /// Method whose result failed to decode.
        method: String,
        /// Underlying serde error.
        #[source]
        source: serde_json::Error,
    },
    /// The remote side answered with an error object.
    #[error("{method} rejected by remote: {message} (code {code})")]
    Remote {
        /// Method that was rejected.
        method: String,
        /// Remote error code.
        code: i64,
        /// Remote error message.
        message: String,
    },
}

impl RpcError {
    pub(crate) fn transport(
        operation: &'static str,
        source: impl Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transport {
            operation,
            source: Box::new(source),
        }
    }

    /// Whether the error means the connection is gone.
    #[must_use]
    pub const fn is_connection_closed(&self) -> bool {
        matches!(self, Self::ConnectionClosed | Self::Transport { .. })
    }
}

//! # Design
//!
//! - One crate-level error for binding and serving the HTTP listener.
//! - Messages stay constant; the address lives in a structured field.

use std::net::SocketAddr;

use thiserror::Error;

/// Result alias for API server operations.
pub type ApiServerResult<T> = Result<T, ApiServerError>;

/// Errors raised while binding or serving the API.
#[derive(Debug, Error)]
pub enum ApiServerError {
    /// Binding the listener failed.
    #[error("failed to bind api listener on {addr}")]
    Bind {
        /// Address attempted.
        addr: SocketAddr,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
    /// Serving stopped with an IO failure.
    #[error("api server terminated unexpectedly")]
    Serve {
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;
    use std::io;

    #[test]
    fn messages_and_sources() {
        let addr: SocketAddr = ([127, 0, 0, 1], 7200).into();
        let cases = [
            (
                ApiServerError::Bind {
                    addr,
                    source: io::Error::new(io::ErrorKind::AddrInUse, "in use"),
                },
                "failed to bind api listener on 127.0.0.1:7200",
            ),
            (
                ApiServerError::Serve {
                    source: io::Error::other("reset"),
                },
                "api server terminated unexpectedly",
            ),
        ];
        for (err, message) in cases {
            assert_eq!(err.to_string(), message);
            assert!(err.source().is_some());
        }
    }
}

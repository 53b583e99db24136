//! Frame transports.
//!
//! # Design
//! - A connection is split into a write half and a read half so the client can
//!   drive each from its own task.
//! - One frame carries exactly one JSON text message; control frames never
//!   reach the client.

use async_trait::async_trait;

use crate::error::RpcResult;

/// In-process transport used by tests and fakes.
pub mod memory;
/// WebSocket transport for real daemon connections.
pub mod websocket;

/// Write half of a duplex frame connection.
#[async_trait]
pub trait FrameSink: Send {
    /// Send one text frame.
    async fn send_frame(&mut self, frame: String) -> RpcResult<()>;

    /// Close the connection cooperatively.
    async fn close(&mut self) -> RpcResult<()>;
}

/// Read half of a duplex frame connection.
#[async_trait]
pub trait FrameSource: Send {
    /// Next text frame, `None` once the peer has closed the connection.
    async fn next_frame(&mut self) -> Option<RpcResult<String>>;
}

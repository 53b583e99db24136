#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Duplex JSON-RPC 2.0 client that correlates responses by request id and
//! fans unsolicited notifications out to registered handlers.
//!
//! Layout: `transport/` (frame sink/source traits, websocket and in-memory
//! adapters), `message.rs` (wire envelope codec), `client.rs` (correlation
//! client and background read/write loops), `error.rs`.

/// Correlation client and its builder.
pub mod client;
/// Error types for RPC operations.
pub mod error;
mod message;
/// Frame-oriented transports the client runs on.
pub mod transport;

pub use client::{NotificationHandler, RpcClient, RpcClientBuilder};
pub use error::{RpcError, RpcResult};
pub use message::RemoteFault;
pub use transport::{FrameSink, FrameSource};

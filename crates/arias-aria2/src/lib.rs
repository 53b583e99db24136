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

//! Typed client for the aria2 download daemon.
//!
//! Layout: `model/` (wire DTOs and exit codes), `events.rs` (listener
//! registry), `waiter.rs` (per-GID completion waiter), `client.rs` (RPC
//! facade and composite download), `service.rs` (`Downloader` capability).

/// Daemon facade over one RPC connection.
pub mod client;
/// Error types for daemon operations.
pub mod error;
/// Push-event categories and the listener registry.
pub mod events;
/// Daemon data model.
pub mod model;
/// Capability trait consumed by orchestration code.
pub mod service;
/// Download-completion waiter.
pub mod waiter;

pub use client::Aria2Client;
pub use error::{Aria2Error, Aria2Result};
pub use events::{DaemonEvent, EventKind, ListenerId, ListenerRegistry};
pub use model::{
    DownloadEvent, DownloadOptions, ExitStatus, File, Gid, PositionAnchor, Status, StatusName,
    Uri, UriStatus,
};
pub use service::Downloader;
pub use waiter::{CompletionWaiter, DownloadOutcome};

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

//! Download-then-upload tasks and the executor that runs them.
//!
//! Layout: `status.rs` (task state machine), `naming.rs` (object key
//! templates), `request.rs` (accepted request), `task.rs` (`Task`
//! capability), `download.rs` (download-then-upload task), `callback.rs`
//! (webhook delivery), `registry.rs` + `executor.rs` (tracking, concurrency
//! and retention).

/// Webhook delivery of terminal statuses.
pub mod callback;
/// Download-then-upload task.
pub mod download;
/// Error types for task execution.
pub mod error;
/// Concurrency-limited task runner.
pub mod executor;
/// Object key templates.
pub mod naming;
/// Accepted download requests.
pub mod request;
/// Status lookup for submitted tasks.
pub mod registry;
/// Task state machine.
pub mod status;
/// Capability implemented by every task kind.
pub mod task;

pub use callback::CallbackNotifier;
pub use download::{DownloadSettings, DownloadTask, DownloadTaskFactory};
pub use error::{TaskError, TaskResult};
pub use executor::{ExecutorSettings, TaskExecutor};
pub use naming::{format_filename, object_name};
pub use request::DownloadRequest;
pub use registry::TaskRegistry;
pub use status::{TaskState, TaskStatus};
pub use task::{Task, TaskId};

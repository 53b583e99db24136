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

//! Streaming upload of downloaded files into object storage.
//!
//! Layout: `sniff.rs` (content-type detection), `pipe.rs` (streaming gzip
//! producer), `service.rs` (`Storage` capability and shared types),
//! `backend/` (filesystem and HTTP object-store implementations).

/// Storage backends.
pub mod backend;
/// Error types for uploads.
pub mod error;
mod pipe;
/// Content-type detection from a byte prefix.
pub mod sniff;
/// Storage capability and upload types.
pub mod service;

pub use backend::fs::{FsStorage, ObjectMeta};
pub use backend::http::HttpObjectStorage;
pub use error::{StorageError, StorageResult};
pub use service::{ByteSource, Storage, UploadOptions, UploadOutput};

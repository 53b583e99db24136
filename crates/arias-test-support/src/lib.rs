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

//! Shared test helpers used across integration suites.
//! Layout: daemon.rs (scripted in-memory download daemon).

pub mod daemon;

pub use daemon::{FakeDaemon, FakeDaemonBuilder, FakeFile, RecordedCall, Script};

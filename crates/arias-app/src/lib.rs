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

//! Arias application bootstrap wiring.
//!
//! Layout: `cli.rs` (command line), `bootstrap.rs` (service wiring and
//! shutdown), `error.rs`.

/// Application bootstrap and shutdown sequencing.
pub mod bootstrap;
/// Command-line flags.
pub mod cli;
/// Application-level errors.
pub mod error;

pub use bootstrap::{Services, run_app};
pub use cli::Cli;
pub use error::{AppError, AppResult};

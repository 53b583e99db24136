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

//! Binary entrypoint that loads configuration, connects to the download
//! daemon and serves the HTTP API until interrupted.

use arias_app::{AppResult, Cli, run_app};
use clap::Parser;

/// Parses the command line and blocks until shutdown.
#[tokio::main]
async fn main() -> AppResult<()> {
    run_app(Cli::parse()).await
}

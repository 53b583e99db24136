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

//! HTTP surface of the Arias download service.
//!
//! Layout: `error.rs` (server errors), `models.rs` (request/response DTOs),
//! `state.rs` (shared handler state), `http/` (router, handlers, problem
//! responses, request metrics).

pub mod error;
pub mod models;
pub mod state;

mod http;

pub use error::{ApiServerError, ApiServerResult};
pub use http::router::ApiServer;
pub use models::{DownloadBody, HealthResponse, ProblemDetails, SubmitResponse};
pub use state::{ApiState, DaemonProbe};

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

//! Service configuration: YAML file, `ARIAS_*` environment overrides and
//! validation, plus the policy applied to inbound download requests.
//!
//! Layout: `model.rs` (typed configuration), `defaults.rs` (default values),
//! `loader.rs` (file + environment layering), `validate.rs` (checks),
//! `policy.rs` (request policy).

mod defaults;
/// Error types for configuration loading.
pub mod error;
/// File and environment loading.
pub mod loader;
/// Typed configuration model.
pub mod model;
/// Inbound request policy.
pub mod policy;
/// Configuration checks.
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ENV_PREFIX, load_config, load_config_with};
pub use model::{Aria2Config, Config, LoggingSettings, StorageConfig, StorageKind, TaskConfig};
pub use policy::{PolicyViolation, RequestPolicy};
pub use validate::validate;

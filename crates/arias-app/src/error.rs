//! # Design
//!
//! - Centralize application-level errors for bootstrap and serving.
//! - Keep error messages constant while carrying context fields for debugging.
//! - Preserve source errors without re-logging at call sites.

use thiserror::Error;

/// Result alias for application operations.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Loading or validating configuration failed.
    #[error("configuration operation failed")]
    Config {
        /// Operation identifier.
        operation: &'static str,
        /// Source configuration error.
        source: arias_config::ConfigError,
    },
    /// Telemetry operations failed.
    #[error("telemetry operation failed")]
    Telemetry {
        /// Operation identifier.
        operation: &'static str,
        /// Source telemetry error.
        source: arias_telemetry::TelemetryError,
    },
    /// Talking to the download daemon failed.
    #[error("download daemon operation failed")]
    Daemon {
        /// Operation identifier.
        operation: &'static str,
        /// Source daemon error.
        source: arias_aria2::Aria2Error,
    },
    /// Building the object store failed.
    #[error("object storage operation failed")]
    Storage {
        /// Operation identifier.
        operation: &'static str,
        /// Source storage error.
        source: arias_storage::StorageError,
    },
    /// API server operations failed.
    #[error("api server operation failed")]
    ApiServer {
        /// Operation identifier.
        operation: &'static str,
        /// Source API server error.
        source: arias_api::ApiServerError,
    },
    /// Configuration values were invalid.
    #[error("invalid configuration")]
    InvalidConfig {
        /// Field name that failed validation.
        field: &'static str,
        /// Machine-readable reason for the failure.
        reason: &'static str,
        /// Optional value associated with the failure.
        value: Option<String>,
    },
}

impl AppError {
    pub(crate) const fn config(operation: &'static str, source: arias_config::ConfigError) -> Self {
        Self::Config { operation, source }
    }

    pub(crate) const fn telemetry(
        operation: &'static str,
        source: arias_telemetry::TelemetryError,
    ) -> Self {
        Self::Telemetry { operation, source }
    }

    pub(crate) const fn daemon(operation: &'static str, source: arias_aria2::Aria2Error) -> Self {
        Self::Daemon { operation, source }
    }

    pub(crate) const fn storage(
        operation: &'static str,
        source: arias_storage::StorageError,
    ) -> Self {
        Self::Storage { operation, source }
    }

    pub(crate) const fn api_server(
        operation: &'static str,
        source: arias_api::ApiServerError,
    ) -> Self {
        Self::ApiServer { operation, source }
    }
}

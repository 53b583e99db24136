//! # Design
//!
//! - Validation failures name the section and field plus a static reason so
//!   operators can find the offending setting.
//! - File failures keep the path and the underlying IO or YAML error.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading the configuration file failed.
    #[error("failed to read configuration file")]
    Io {
        /// File that could not be read.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The configuration file is not valid YAML for the model.
    #[error("failed to parse configuration file")]
    Parse {
        /// File that failed to parse.
        path: PathBuf,
        /// Underlying YAML error.
        #[source]
        source: serde_yaml::Error,
    },
    /// An environment override could not be parsed.
    #[error("invalid environment override {name}: {reason}")]
    InvalidEnv {
        /// Variable name.
        name: String,
        /// Offending value.
        value: String,
        /// Static reason for the failure.
        reason: &'static str,
    },
    /// A field holds an unusable value.
    #[error("invalid value for '{field}' in '{section}': {reason}")]
    InvalidField {
        /// Section containing the field.
        section: &'static str,
        /// Field that failed validation.
        field: &'static str,
        /// Offending value when available.
        value: Option<String>,
        /// Static reason for the failure.
        reason: &'static str,
    },
}

impl ConfigError {
    pub(crate) fn invalid(
        section: &'static str,
        field: &'static str,
        value: Option<&str>,
        reason: &'static str,
    ) -> Self {
        Self::InvalidField {
            section,
            field,
            value: value.map(str::to_string),
            reason,
        }
    }
}

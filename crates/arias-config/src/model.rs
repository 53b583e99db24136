//! Typed configuration model.
//!
//! Every section has defaults, so a file only needs the settings it changes.
//! Unknown keys are rejected to surface typos.

use std::str::FromStr;
use std::time::Duration;

use arias_telemetry::LogFormat;
use serde::{Deserialize, Serialize};

use crate::defaults;

/// Complete service configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Address the HTTP server binds to.
    pub server_addr: String,
    /// Download daemon connection.
    pub aria2: Aria2Config,
    /// Object storage backend.
    pub storage: StorageConfig,
    /// Bucket used when a request names none.
    pub default_bucket: String,
    /// Whether requests may choose their own bucket.
    pub allow_bucket_override: bool,
    /// Whether requests may omit the object name.
    pub allow_no_name: bool,
    /// Task execution limits.
    pub tasks: TaskConfig,
    /// Logging output.
    pub logging: LoggingSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_addr: defaults::SERVER_ADDR.to_string(),
            aria2: Aria2Config::default(),
            storage: StorageConfig::default(),
            default_bucket: String::new(),
            allow_bucket_override: false,
            allow_no_name: false,
            tasks: TaskConfig::default(),
            logging: LoggingSettings::default(),
        }
    }
}

/// Download daemon connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Aria2Config {
    /// WebSocket JSON-RPC endpoint.
    pub url: String,
    /// RPC secret, sent as `token:<secret>`.
    pub secret: Option<String>,
    /// Directory submitted downloads are saved in.
    pub download_dir: Option<String>,
}

impl Default for Aria2Config {
    fn default() -> Self {
        Self {
            url: defaults::ARIA2_URL.to_string(),
            secret: None,
            download_dir: None,
        }
    }
}

/// Storage backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// Local directory.
    #[default]
    Fs,
    /// HTTP object store.
    Http,
}

impl FromStr for StorageKind {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fs" => Ok(Self::Fs),
            "http" => Ok(Self::Http),
            _ => Err(()),
        }
    }
}

/// Object storage settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Backend to use.
    pub kind: StorageKind,
    /// Root directory for the `fs` backend.
    pub root: String,
    /// Base URL for the `http` backend.
    pub endpoint: Option<String>,
    /// Bearer token for the `http` backend.
    pub token: Option<String>,
    /// Gzip every upload.
    pub compress: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            kind: StorageKind::Fs,
            root: defaults::STORAGE_ROOT.to_string(),
            endpoint: None,
            token: None,
            compress: false,
        }
    }
}

/// Task execution settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TaskConfig {
    /// Tasks allowed to run at once.
    pub max_concurrent: usize,
    /// Seconds a finished task's status stays queryable.
    pub retention_secs: u64,
    /// Seconds between evictions of expired statuses.
    pub prune_interval_secs: u64,
    /// Seconds before a callback request is abandoned.
    pub callback_timeout_secs: u64,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            max_concurrent: defaults::MAX_CONCURRENT,
            retention_secs: defaults::RETENTION_SECS,
            prune_interval_secs: defaults::PRUNE_INTERVAL_SECS,
            callback_timeout_secs: defaults::CALLBACK_TIMEOUT_SECS,
        }
    }
}

impl TaskConfig {
    /// Retention window.
    #[must_use]
    pub const fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    /// Pruning period.
    #[must_use]
    pub const fn prune_interval(&self) -> Duration {
        Duration::from_secs(self.prune_interval_secs)
    }

    /// Callback timeout.
    #[must_use]
    pub const fn callback_timeout(&self) -> Duration {
        Duration::from_secs(self.callback_timeout_secs)
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSettings {
    /// Level or filter directive.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            format: LogFormat::infer(),
        }
    }
}

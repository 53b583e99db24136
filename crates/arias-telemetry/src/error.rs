//! Error types for telemetry operations.

use std::error::Error;
use std::fmt::{self, Display, Formatter};

use prometheus::Error as PrometheusError;

/// Result alias for telemetry operations.
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Errors raised by telemetry helpers.
#[derive(Debug)]
pub enum TelemetryError {
    /// The log level or filter directive could not be parsed.
    InvalidFilter {
        /// Directive that failed to parse.
        directive: String,
        /// Underlying parse error.
        source: tracing_subscriber::filter::ParseError,
    },
    /// Installing the tracing subscriber failed.
    SubscriberInstall {
        /// Underlying tracing subscriber error.
        source: tracing_subscriber::util::TryInitError,
    },
    /// Building a Prometheus collector failed.
    MetricsCollector {
        /// Metric identifier tied to the failure.
        name: &'static str,
        /// Underlying Prometheus error.
        source: PrometheusError,
    },
    /// Registering a Prometheus collector failed.
    MetricsRegister {
        /// Metric identifier tied to the failure.
        name: &'static str,
        /// Underlying Prometheus error.
        source: PrometheusError,
    },
    /// Encoding Prometheus metrics failed.
    MetricsEncode {
        /// Underlying Prometheus error.
        source: PrometheusError,
    },
    /// Rendered metrics output was not valid UTF-8.
    MetricsUtf8 {
        /// Underlying UTF-8 conversion error.
        source: std::string::FromUtf8Error,
    },
}

impl Display for TelemetryError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidFilter { .. } => formatter.write_str("invalid log filter directive"),
            Self::SubscriberInstall { .. } => {
                formatter.write_str("failed to install tracing subscriber")
            }
            Self::MetricsCollector { .. } => {
                formatter.write_str("failed to build metrics collector")
            }
            Self::MetricsRegister { .. } => {
                formatter.write_str("failed to register metrics collector")
            }
            Self::MetricsEncode { .. } => formatter.write_str("failed to encode metrics"),
            Self::MetricsUtf8 { .. } => formatter.write_str("metrics output was not valid utf-8"),
        }
    }
}

impl Error for TelemetryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidFilter { source, .. } => Some(source),
            Self::SubscriberInstall { source } => Some(source),
            Self::MetricsCollector { source, .. }
            | Self::MetricsRegister { source, .. }
            | Self::MetricsEncode { source } => Some(source),
            Self::MetricsUtf8 { source } => Some(source),
        }
    }
}

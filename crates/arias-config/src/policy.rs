//! Policy applied to inbound download requests before a task is created.

use thiserror::Error;

use crate::model::Config;

/// Why a request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PolicyViolation {
    /// The request has no URL.
    #[error("url not specified")]
    MissingUrl,
    /// The request names a bucket but overrides are disabled.
    #[error("bucket override forbidden")]
    BucketOverride,
    /// The request has no name but one is required.
    #[error("name must be provided")]
    MissingName,
}

/// Bucket and naming rules derived from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestPolicy {
    default_bucket: String,
    allow_bucket_override: bool,
    allow_no_name: bool,
}

impl From<&Config> for RequestPolicy {
    fn from(config: &Config) -> Self {
        Self {
            default_bucket: config.default_bucket.clone(),
            allow_bucket_override: config.allow_bucket_override,
            allow_no_name: config.allow_no_name,
        }
    }
}

impl RequestPolicy {
    /// Policy with explicit rules.
    #[must_use]
    pub fn new(
        default_bucket: impl Into<String>,
        allow_bucket_override: bool,
        allow_no_name: bool,
    ) -> Self {
        Self {
            default_bucket: default_bucket.into(),
            allow_bucket_override,
            allow_no_name,
        }
    }

    /// Bucket used when a request names none.
    #[must_use]
    pub fn default_bucket(&self) -> &str {
        &self.default_bucket
    }

    /// Check a request and return the bucket it stores into. Empty strings
    /// count as absent.
    ///
    /// # Errors
    ///
    /// Returns the first rule the request breaks, checking the URL, then the
    /// bucket, then the name.
    pub fn resolve(
        &self,
        url: Option<&str>,
        bucket: Option<&str>,
        name: Option<&str>,
    ) -> Result<String, PolicyViolation> {
        if present(url).is_none() {
            return Err(PolicyViolation::MissingUrl);
        }
        let bucket = match present(bucket) {
            None => self.default_bucket.clone(),
            Some(_) if !self.allow_bucket_override => return Err(PolicyViolation::BucketOverride),
            Some(bucket) => bucket.to_string(),
        };
        if present(name).is_none() && !self.allow_no_name {
            return Err(PolicyViolation::MissingName);
        }
        Ok(bucket)
    }
}

fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.trim().is_empty())
}

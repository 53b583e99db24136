use serde::{Deserialize, Serialize};

/// Download request accepted for execution. The bucket is already resolved
/// against the service's request policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRequest {
    /// Location to download.
    pub url: String,
    /// Bucket the file is stored in.
    pub bucket: String,
    /// Object key template; the file's base name when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// URL notified with the terminal status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback: Option<String>,
}

impl DownloadRequest {
    /// Request for `url` stored into `bucket` under the file's own name.
    #[must_use]
    pub fn new(url: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            bucket: bucket.into(),
            name: None,
            callback: None,
        }
    }

    /// Store under a name derived from `template`.
    #[must_use]
    pub fn with_name(mut self, template: impl Into<String>) -> Self {
        self.name = Some(template.into());
        self
    }

    /// Notify `url` once the task finishes.
    #[must_use]
    pub fn with_callback(mut self, url: impl Into<String>) -> Self {
        self.callback = Some(url.into());
        self
    }
}

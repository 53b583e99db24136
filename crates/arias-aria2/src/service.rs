//! Capability trait implemented by download backends.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Aria2Result;
use crate::model::{DownloadOptions, Gid, Status};

/// Submit-and-wait downloads plus artifact cleanup.
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Submit `uris` and block until the download reaches a terminal state or
    /// `cancel` fires.
    async fn download(
        &self,
        uris: &[String],
        options: &DownloadOptions,
        cancel: &CancellationToken,
    ) -> Aria2Result<Status>;

    /// Remove the download and delete its local files.
    async fn delete(&self, gid: &Gid) -> Aria2Result<()>;
}

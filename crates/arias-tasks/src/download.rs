//! Download-then-upload task.
//!
//! # Design
//! - Status mutation is confined to [`DownloadTask::run`]; readers take a
//!   cloned snapshot under a short read lock.
//! - The callback fires after the terminal status is recorded, and cleanup of
//!   the daemon download runs last regardless of outcome. Neither can change
//!   the recorded outcome.

use std::sync::{Arc, PoisonError, RwLock};

use arias_aria2::{DownloadOptions, Downloader, File, Gid};
use arias_storage::{Storage, UploadOptions, UploadOutput};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::callback::CallbackNotifier;
use crate::error::{TaskError, TaskResult};
use crate::naming::object_name;
use crate::request::DownloadRequest;
use crate::status::{TaskState, TaskStatus};
use crate::task::{Task, TaskId};

/// Service-wide knobs applied to every download task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadSettings {
    /// Directory the daemon saves into; the daemon's default when absent.
    pub download_dir: Option<String>,
    /// Gzip every upload.
    pub compress: bool,
}

struct Shared {
    downloader: Arc<dyn Downloader>,
    storage: Arc<dyn Storage>,
    notifier: CallbackNotifier,
    settings: DownloadSettings,
}

/// Builds [`DownloadTask`]s that share one daemon, storage backend and
/// notifier.
#[derive(Clone)]
pub struct DownloadTaskFactory {
    shared: Arc<Shared>,
}

impl DownloadTaskFactory {
    /// Factory over the given collaborators.
    #[must_use]
    pub fn new(
        downloader: Arc<dyn Downloader>,
        storage: Arc<dyn Storage>,
        notifier: CallbackNotifier,
        settings: DownloadSettings,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                downloader,
                storage,
                notifier,
                settings,
            }),
        }
    }

    /// New task in `waiting` for `request`.
    #[must_use]
    pub fn create(&self, request: DownloadRequest) -> Arc<DownloadTask> {
        Arc::new(DownloadTask {
            id: Uuid::new_v4(),
            request,
            shared: Arc::clone(&self.shared),
            status: RwLock::new(TaskStatus::new()),
        })
    }
}

/// Downloads one URL through the daemon and stores the resulting file.
pub struct DownloadTask {
    id: TaskId,
    request: DownloadRequest,
    shared: Arc<Shared>,
    status: RwLock<TaskStatus>,
}

impl DownloadTask {
    /// Request this task was created for.
    #[must_use]
    pub const fn request(&self) -> &DownloadRequest {
        &self.request
    }

    fn update(&self, apply: impl FnOnce(&mut TaskStatus)) {
        let mut guard = self.status.write().unwrap_or_else(PoisonError::into_inner);
        apply(&mut guard);
    }

    fn options(&self) -> DownloadOptions {
        match &self.shared.settings.download_dir {
            Some(dir) => DownloadOptions::new().with_dir(dir.clone()),
            None => DownloadOptions::new(),
        }
    }

    async fn perform(
        &self,
        cancel: &CancellationToken,
        gid: &mut Option<Gid>,
    ) -> TaskResult<UploadOutput> {
        if cancel.is_cancelled() {
            return Err(TaskError::Cancelled);
        }

        self.update(|status| status.enter(TaskState::Downloading));
        let file = self.download(cancel, gid).await?;

        info!(path = %file.path.display(), "upload started");
        self.update(|status| status.enter(TaskState::Uploading));
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(TaskError::Cancelled),
            result = self.upload(&file) => result,
        }
    }

    async fn download(
        &self,
        cancel: &CancellationToken,
        gid: &mut Option<Gid>,
    ) -> TaskResult<File> {
        let uris = [self.request.url.clone()];
        let status = match self
            .shared
            .downloader
            .download(&uris, &self.options(), cancel)
            .await
        {
            Ok(status) => status,
            Err(err) => {
                *gid = err.gid().cloned();
                return Err(err.into());
            }
        };
        gid.clone_from(&status.gid);

        let count = status.files.len();
        let mut files = status.files.into_iter();
        match (files.next(), files.next()) {
            (Some(file), None) => Ok(file),
            _ => Err(TaskError::InvalidFileCount { count }),
        }
    }

    async fn upload(&self, file: &File) -> TaskResult<UploadOutput> {
        let key = object_name(self.request.name.as_deref(), &file.path).ok_or_else(|| {
            TaskError::UnnamedFile {
                path: file.path.clone(),
            }
        })?;
        let source = tokio::fs::File::open(&file.path)
            .await
            .map_err(|source| TaskError::open(file.path.clone(), source))?;
        let options = UploadOptions::new(self.request.bucket.clone(), key)
            .with_compression(self.shared.settings.compress);
        Ok(self.shared.storage.upload(Box::new(source), &options).await?)
    }

    async fn send_callback(&self) {
        let Some(url) = &self.request.callback else {
            return;
        };
        let status = self.status();
        if let Err(err) = self.shared.notifier.notify(url, self.id, &status).await {
            warn!(error = %err, url = %url, "callback delivery failed");
        }
    }

    async fn cleanup(&self, gid: &Gid) {
        if let Err(err) = self.shared.downloader.delete(gid).await {
            warn!(error = %err, gid = %gid, "failed to clean up daemon download");
        }
    }
}

#[async_trait]
impl Task for DownloadTask {
    fn id(&self) -> TaskId {
        self.id
    }

    fn status(&self) -> TaskStatus {
        self.status
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[instrument(name = "task.run", skip_all, fields(task_id = %self.id, url = %self.request.url))]
    async fn run(&self, cancel: CancellationToken) -> TaskResult<()> {
        self.update(TaskStatus::start);
        info!("download started");

        let mut gid = None;
        let outcome = self.perform(&cancel, &mut gid).await;
        match &outcome {
            Ok(output) => {
                info!(bucket = %output.bucket, key = %output.key, "task done");
                self.update(|status| status.finish(output.clone()));
            }
            Err(err) => {
                warn!(error = %err, "task failed");
                self.update(|status| status.fail(err.report()));
            }
        }

        self.send_callback().await;
        if let Some(gid) = gid {
            self.cleanup(&gid).await;
        }
        outcome.map(|_| ())
    }
}

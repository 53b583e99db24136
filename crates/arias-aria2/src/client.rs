//! Typed facade over the daemon's RPC methods.
//!
//! # Design
//! - One [`Aria2Client`] owns one connection, its listener registry, and its
//!   completion waiter; nothing is process-global.
//! - Terminal notifications resolve the waiter before fanning out to
//!   listeners, so a waiter never misses an event a listener observed.
//! - When an RPC secret is configured every call carries `token:<secret>` as
//!   its first parameter.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arias_rpc::transport::websocket;
use arias_rpc::{FrameSink, FrameSource, RpcClient};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::{Aria2Error, Aria2Result};
use crate::events::{DaemonEvent, EventKind, ListenerId, ListenerRegistry};
use crate::model::{DownloadEvent, DownloadOptions, File, Gid, PositionAnchor, Status, Uri};
use crate::service::Downloader;
use crate::waiter::{CompletionWaiter, DownloadOutcome};

const CONTROL_FILE_SUFFIX: &str = ".aria2";

struct Inner {
    rpc: RpcClient,
    token: Option<String>,
    registry: Arc<ListenerRegistry>,
    waiter: Arc<CompletionWaiter>,
}

/// Connection to one download daemon.
#[derive(Clone)]
pub struct Aria2Client {
    inner: Arc<Inner>,
}

impl Aria2Client {
    /// Dial the daemon's websocket endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`Aria2Error::Connect`] if the handshake fails.
    pub async fn connect(url: &str, secret: Option<String>) -> Aria2Result<Self> {
        let (sink, source) =
            websocket::connect(url)
                .await
                .map_err(|source| Aria2Error::Connect {
                    url: url.to_string(),
                    source,
                })?;
        info!(url, "connected to download daemon");
        Ok(Self::from_transport(sink, source, secret))
    }

    /// Run the client over an already-established transport.
    ///
    /// Must be called within a Tokio runtime.
    pub fn from_transport<S, R>(sink: S, source: R, secret: Option<String>) -> Self
    where
        S: FrameSink + 'static,
        R: FrameSource + 'static,
    {
        let registry = Arc::new(ListenerRegistry::new());
        let waiter = Arc::new(CompletionWaiter::new());

        let mut builder = RpcClient::builder();
        for kind in EventKind::ALL {
            let registry = Arc::clone(&registry);
            let waiter = Arc::clone(&waiter);
            builder = builder.handle(kind.method(), move |params: Value| {
                route_notification(kind, params, &registry, &waiter);
            });
        }
        let rpc = builder.spawn(sink, source);

        let closed = rpc.closed_owned();
        let close_waiter = Arc::clone(&waiter);
        tokio::spawn(async move {
            closed.await;
            close_waiter.close();
            debug!("download daemon connection closed");
        });

        Self {
            inner: Arc::new(Inner {
                rpc,
                token: secret.map(|secret| format!("token:{secret}")),
                registry,
                waiter,
            }),
        }
    }

    async fn call<R: DeserializeOwned>(
        &self,
        method: &'static str,
        args: Vec<Value>,
    ) -> Aria2Result<R> {
        let params: Vec<Value> = self
            .inner
            .token
            .iter()
            .map(|token| Value::String(token.clone()))
            .chain(args)
            .collect();
        self.inner
            .rpc
            .call(method, params)
            .await
            .map_err(|source| Aria2Error::rpc(method, source))
    }

    /// Queue a new download and return its GID.
    ///
    /// `uris` must reference the same resource; a magnet URI must be the only
    /// entry.
    ///
    /// # Errors
    ///
    /// Returns [`Aria2Error::InvalidInput`] for an empty list or a magnet URI
    /// mixed with other sources, and [`Aria2Error::Rpc`] if the daemon call
    /// fails.
    pub async fn add_uri(&self, uris: &[String], options: &DownloadOptions) -> Aria2Result<Gid> {
        if uris.is_empty() {
            return Err(Aria2Error::InvalidInput {
                field: "uris",
                reason: "at least one uri is required",
            });
        }
        if uris.len() > 1 && uris.iter().any(|uri| uri.starts_with("magnet:")) {
            return Err(Aria2Error::InvalidInput {
                field: "uris",
                reason: "a magnet uri must be the only source",
            });
        }
        let mut args = vec![json!(uris)];
        if !options.is_empty() {
            args.push(json!(options));
        }
        self.call("aria2.addUri", args).await
    }

    /// Stop and remove a download.
    ///
    /// # Errors
    ///
    /// Returns [`Aria2Error::Rpc`] if the daemon call fails.
    pub async fn remove(&self, gid: &Gid) -> Aria2Result<Gid> {
        self.call("aria2.remove", vec![json!(gid)]).await
    }

    /// Remove a download without cooperative teardown.
    ///
    /// # Errors
    ///
    /// Returns [`Aria2Error::Rpc`] if the daemon call fails.
    pub async fn force_remove(&self, gid: &Gid) -> Aria2Result<Gid> {
        self.call("aria2.forceRemove", vec![json!(gid)]).await
    }

    /// Pause a download, keeping its queue position.
    ///
    /// # Errors
    ///
    /// Returns [`Aria2Error::Rpc`] if the daemon call fails.
    pub async fn pause(&self, gid: &Gid) -> Aria2Result<Gid> {
        self.call("aria2.pause", vec![json!(gid)]).await
    }

    /// Pause every active or waiting download.
    ///
    /// # Errors
    ///
    /// Returns [`Aria2Error::Rpc`] if the daemon call fails.
    pub async fn pause_all(&self) -> Aria2Result<()> {
        self.call::<String>("aria2.pauseAll", Vec::new()).await.map(drop)
    }

    /// Pause a download without cooperative teardown.
    ///
    /// # Errors
    ///
    /// Returns [`Aria2Error::Rpc`] if the daemon call fails.
    pub async fn force_pause(&self, gid: &Gid) -> Aria2Result<Gid> {
        self.call("aria2.forcePause", vec![json!(gid)]).await
    }

    /// Force-pause every active or waiting download.
    ///
    /// # Errors
    ///
    /// Returns [`Aria2Error::Rpc`] if the daemon call fails.
    pub async fn force_pause_all(&self) -> Aria2Result<()> {
        self.call::<String>("aria2.forcePauseAll", Vec::new())
            .await
            .map(drop)
    }

    /// Move a paused download back to waiting.
    ///
    /// # Errors
    ///
    /// Returns [`Aria2Error::Rpc`] if the daemon call fails.
    pub async fn unpause(&self, gid: &Gid) -> Aria2Result<Gid> {
        self.call("aria2.unpause", vec![json!(gid)]).await
    }

    /// Unpause every paused download.
    ///
    /// # Errors
    ///
    /// Returns [`Aria2Error::Rpc`] if the daemon call fails.
    pub async fn unpause_all(&self) -> Aria2Result<()> {
        self.call::<String>("aria2.unpauseAll", Vec::new())
            .await
            .map(drop)
    }

    /// Query a download's status; a non-empty `keys` restricts the reply to
    /// those fields.
    ///
    /// # Errors
    ///
    /// Returns [`Aria2Error::Rpc`] if the daemon call fails.
    pub async fn tell_status(&self, gid: &Gid, keys: &[&str]) -> Aria2Result<Status> {
        let mut args = vec![json!(gid)];
        if !keys.is_empty() {
            args.push(json!(keys));
        }
        self.call("aria2.tellStatus", args).await
    }

    /// Sources of a download.
    ///
    /// # Errors
    ///
    /// Returns [`Aria2Error::Rpc`] if the daemon call fails.
    pub async fn get_uris(&self, gid: &Gid) -> Aria2Result<Vec<Uri>> {
        self.call("aria2.getUris", vec![json!(gid)]).await
    }

    /// Files of a download.
    ///
    /// # Errors
    ///
    /// Returns [`Aria2Error::Rpc`] if the daemon call fails.
    pub async fn get_files(&self, gid: &Gid) -> Aria2Result<Vec<File>> {
        self.call("aria2.getFiles", vec![json!(gid)]).await
    }

    /// Move a download within the queue; the daemon clamps the result to the
    /// queue bounds. Returns the new position.
    ///
    /// # Errors
    ///
    /// Returns [`Aria2Error::Rpc`] if the daemon call fails.
    pub async fn change_position(
        &self,
        gid: &Gid,
        offset: i64,
        anchor: PositionAnchor,
    ) -> Aria2Result<u64> {
        self.call(
            "aria2.changePosition",
            vec![json!(gid), json!(offset), json!(anchor)],
        )
        .await
    }

    /// Forget a completed, errored, or removed download.
    ///
    /// # Errors
    ///
    /// Returns [`Aria2Error::Rpc`] if the daemon call fails.
    pub async fn remove_download_result(&self, gid: &Gid) -> Aria2Result<()> {
        self.call::<String>("aria2.removeDownloadResult", vec![json!(gid)])
            .await
            .map(drop)
    }

    /// Block until `gid` reaches a terminal state.
    ///
    /// # Errors
    ///
    /// Returns [`Aria2Error::Disconnected`] if the connection closes first.
    pub async fn wait_for_download(&self, gid: &Gid) -> Aria2Result<DownloadOutcome> {
        self.inner
            .waiter
            .wait(gid)
            .await
            .ok_or_else(|| Aria2Error::Disconnected { gid: gid.clone() })
    }

    /// Submit a download and block until it finishes or `cancel` fires.
    ///
    /// On cancellation the download is removed from the daemon and
    /// [`Aria2Error::Cancelled`] is returned.
    ///
    /// # Errors
    ///
    /// Returns [`Aria2Error::DownloadFailed`] with the daemon's error code and
    /// message if the download stops or errors, and [`Aria2Error::Status`] if
    /// the final status query fails, plus any error from submitting.
    #[instrument(name = "aria2.download", skip(self, options, cancel), fields(gid))]
    pub async fn download(
        &self,
        uris: &[String],
        options: &DownloadOptions,
        cancel: &CancellationToken,
    ) -> Aria2Result<Status> {
        let gid = self.add_uri(uris, options).await?;
        tracing::Span::current().record("gid", gid.as_str());
        debug!("download submitted");

        let outcome = tokio::select! {
            biased;
            outcome = self.wait_for_download(&gid) => outcome?,
            () = cancel.cancelled() => {
                if let Err(err) = self.remove(&gid).await {
                    warn!(error = %err, "failed to remove cancelled download");
                }
                self.inner.waiter.discard(&gid);
                return Err(Aria2Error::Cancelled { gid });
            }
        };

        let status = match self.tell_status(&gid, &[]).await {
            Ok(status) => status,
            Err(Aria2Error::Rpc { source, .. }) => {
                return Err(Aria2Error::Status { gid, source });
            }
            Err(err) => return Err(err),
        };
        if outcome.is_success() {
            debug!(files = status.files.len(), "download completed");
            Ok(status)
        } else {
            Err(Aria2Error::DownloadFailed {
                gid,
                outcome,
                error_code: status.error_code,
                error_message: status.error_message,
            })
        }
    }

    /// Remove a download from the daemon and delete its local files.
    ///
    /// Downloads that already finished are purged from the daemon's result
    /// list instead. Files that are already gone are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Aria2Error::Rpc`] if the daemon calls fail and
    /// [`Aria2Error::FileCleanup`] if a file cannot be deleted.
    #[instrument(name = "aria2.delete", skip(self), fields(gid = %gid))]
    pub async fn delete(&self, gid: &Gid) -> Aria2Result<()> {
        let files = self.get_files(gid).await?;
        match self.remove(gid).await {
            Ok(_) => {}
            Err(err) if err.is_remote_rejection() => {
                debug!(error = %err, "download no longer active; purging result");
                self.remove_download_result(gid).await?;
            }
            Err(err) => return Err(err),
        }

        for file in files {
            if file.path.as_os_str().is_empty() {
                continue;
            }
            remove_local_file(&file.path).await?;
            remove_local_file(&control_file_path(&file.path)).await?;
        }
        Ok(())
    }

    /// Register a listener for one notification category.
    pub fn subscribe<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&DownloadEvent) + Send + Sync + 'static,
    {
        self.inner.registry.subscribe(kind, listener)
    }

    /// Remove a listener registered with [`Aria2Client::subscribe`].
    pub fn unsubscribe(&self, kind: EventKind, id: ListenerId) -> bool {
        self.inner.registry.unsubscribe(kind, id)
    }

    /// Stream of every daemon notification.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<DaemonEvent> {
        self.inner.registry.stream()
    }

    /// Completion waiter backing [`Aria2Client::wait_for_download`].
    #[must_use]
    pub fn waiter(&self) -> &CompletionWaiter {
        &self.inner.waiter
    }

    /// Close the connection; pending calls and waits fail.
    pub fn close(&self) {
        self.inner.rpc.close();
    }

    /// Whether the connection has shut down.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.rpc.is_closed()
    }

    /// Resolves once the connection has shut down.
    pub async fn closed(&self) {
        self.inner.rpc.closed().await;
    }
}

#[async_trait]
impl Downloader for Aria2Client {
    async fn download(
        &self,
        uris: &[String],
        options: &DownloadOptions,
        cancel: &CancellationToken,
    ) -> Aria2Result<Status> {
        Self::download(self, uris, options, cancel).await
    }

    async fn delete(&self, gid: &Gid) -> Aria2Result<()> {
        Self::delete(self, gid).await
    }
}

fn route_notification(
    kind: EventKind,
    params: Value,
    registry: &ListenerRegistry,
    waiter: &CompletionWaiter,
) {
    let events: Vec<DownloadEvent> = match serde_json::from_value(params) {
        Ok(events) => events,
        Err(err) => {
            warn!(kind = kind.label(), error = %err, "discarding malformed daemon notification");
            return;
        }
    };
    for event in events {
        if let Some(outcome) = kind.terminal_outcome() {
            waiter.resolve(&event.gid, outcome);
        }
        registry.dispatch(kind, &event);
    }
}

fn control_file_path(path: &Path) -> PathBuf {
    let mut control = path.as_os_str().to_owned();
    control.push(CONTROL_FILE_SUFFIX);
    PathBuf::from(control)
}

async fn remove_local_file(path: &Path) -> Aria2Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            debug!(path = %path.display(), "deleted downloaded file");
            Ok(())
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(Aria2Error::FileCleanup {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_file_sits_next_to_download() {
        assert_eq!(
            control_file_path(Path::new("/downloads/a.bin")),
            PathBuf::from("/downloads/a.bin.aria2")
        );
    }
}

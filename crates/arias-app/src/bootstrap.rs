//! Service wiring and shutdown sequencing.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use arias_api::{ApiServer, ApiServerError, ApiState};
use arias_aria2::Aria2Client;
use arias_config::{Config, RequestPolicy, StorageConfig, StorageKind, load_config};
use arias_storage::{FsStorage, HttpObjectStorage, Storage};
use arias_tasks::{
    CallbackNotifier, DownloadSettings, DownloadTaskFactory, ExecutorSettings, TaskExecutor,
};
use arias_telemetry::{LoggingConfig, Metrics, build_sha, init_logging};
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::cli::Cli;
use crate::error::{AppError, AppResult};

/// Entry point for the boot sequence: configuration, logging, daemon
/// connection, then the HTTP listener until Ctrl-C.
///
/// # Errors
///
/// Returns an error if configuration is invalid, the daemon cannot be
/// reached, the listener cannot be bound, or serving fails.
pub async fn run_app(cli: Cli) -> AppResult<()> {
    let config =
        load_config(cli.config.as_deref()).map_err(|err| AppError::config("config.load", err))?;
    init_logging(&LoggingConfig {
        level: &config.logging.level,
        format: config.logging.format,
        build_sha: build_sha(),
    })
    .map_err(|err| AppError::telemetry("telemetry.init", err))?;
    info!(config = ?cli.config, "arias bootstrap starting");

    let addr: SocketAddr = config
        .server_addr
        .parse()
        .map_err(|_| AppError::InvalidConfig {
            field: "server_addr",
            reason: "unparsable",
            value: Some(config.server_addr.clone()),
        })?;
    let client = Aria2Client::connect(&config.aria2.url, config.aria2.secret.clone())
        .await
        .map_err(|err| AppError::daemon("aria2.connect", err))?;
    let services = Services::build(&config, client)?;

    let listener = TcpListener::bind(addr).await.map_err(|source| {
        AppError::api_server("api_server.bind", ApiServerError::Bind { addr, source })
    })?;
    services.run(listener, ctrl_c()).await
}

/// Every long-lived collaborator of a running service.
pub struct Services {
    client: Aria2Client,
    metrics: Metrics,
    executor: TaskExecutor,
    api: ApiServer,
}

impl Services {
    /// Wire storage, the task engine and the HTTP surface around an
    /// established daemon connection.
    ///
    /// # Errors
    ///
    /// Returns an error if metrics cannot be registered or the configured
    /// object store cannot be built.
    pub fn build(config: &Config, client: Aria2Client) -> AppResult<Self> {
        let metrics =
            Metrics::new().map_err(|err| AppError::telemetry("telemetry.metrics", err))?;
        let storage = build_storage(&config.storage)?;
        let factory = DownloadTaskFactory::new(
            Arc::new(client.clone()),
            storage,
            CallbackNotifier::new(config.tasks.callback_timeout()),
            DownloadSettings {
                download_dir: config.aria2.download_dir.clone(),
                compress: config.storage.compress,
            },
        );
        let executor = TaskExecutor::new(
            ExecutorSettings {
                max_concurrent: config.tasks.max_concurrent,
                retention: config.tasks.retention(),
                prune_interval: config.tasks.prune_interval(),
            },
            metrics.clone(),
        );
        let state = ApiState::new(
            executor.clone(),
            factory,
            RequestPolicy::from(config),
            metrics.clone(),
            Arc::new(client.clone()),
        );
        Ok(Self {
            client,
            metrics,
            executor,
            api: ApiServer::new(state),
        })
    }

    /// Serve on `listener` until `shutdown` resolves or the daemon
    /// connection drops, then cancel in-flight tasks and close the
    /// connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP server stops with an IO failure.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> AppResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Self {
            client,
            metrics,
            executor,
            api,
        } = self;
        let pruner = executor.spawn_pruner();
        let counter = spawn_event_counter(&client, metrics);

        let daemon = client.clone();
        let stop = async move {
            tokio::select! {
                () = shutdown => info!("shutdown requested"),
                () = daemon.closed() => error!("download daemon connection lost"),
            }
        };
        let served = api.serve_on(listener, stop).await;

        executor.shutdown().await;
        client.close();
        for (name, handle) in [("task pruner", pruner), ("event counter", counter)] {
            if let Err(err) = handle.await {
                warn!(error = %err, task = name, "background task join failed");
            }
        }

        served.map_err(|err| AppError::api_server("api_server.serve", err))?;
        info!("arias shutdown complete");
        Ok(())
    }
}

fn build_storage(config: &StorageConfig) -> AppResult<Arc<dyn Storage>> {
    match config.kind {
        StorageKind::Fs => Ok(Arc::new(FsStorage::new(config.root.as_str()))),
        StorageKind::Http => {
            let endpoint = config
                .endpoint
                .as_deref()
                .ok_or(AppError::InvalidConfig {
                    field: "storage.endpoint",
                    reason: "missing",
                    value: None,
                })?;
            let storage = HttpObjectStorage::new(endpoint, config.token.clone())
                .map_err(|err| AppError::storage("storage.http", err))?;
            Ok(Arc::new(storage))
        }
    }
}

fn spawn_event_counter(client: &Aria2Client, metrics: Metrics) -> JoinHandle<()> {
    let mut events = client.events();
    let client = client.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = client.closed() => break,
                received = events.recv() => match received {
                    Ok(event) => metrics.inc_daemon_event(event.kind.label()),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "daemon event counter lagged");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
    })
}

async fn ctrl_c() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "ctrl-c handler unavailable; serving until the daemon disconnects");
        std::future::pending::<()>().await;
    }
}

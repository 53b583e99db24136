//! Router construction and server host for the API.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use arias_telemetry::build_sha;
use axum::{
    Router,
    http::Request,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{Span, info};

use crate::error::{ApiServerError, ApiServerResult};
use crate::http::constants::HEADER_REQUEST_ID;
use crate::http::downloads::{submit_download, task_status};
use crate::http::health::{health, metrics};
use crate::http::telemetry::HttpMetricsLayer;
use crate::state::ApiState;

/// Axum router wrapper that hosts the download API.
pub struct ApiServer {
    router: Router,
}

impl ApiServer {
    /// Build the router over `state`.
    #[must_use]
    pub fn new(state: ApiState) -> Self {
        let telemetry = state.metrics.clone();
        let trace_layer = TraceLayer::new_for_http()
            .make_span_with(|request: &Request<_>| {
                let request_id = request
                    .headers()
                    .get(HEADER_REQUEST_ID)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("")
                    .to_string();
                tracing::info_span!(
                    "http.request",
                    method = %request.method(),
                    route = %request.uri().path(),
                    request_id = %request_id,
                    build_sha = %build_sha(),
                    status_code = tracing::field::Empty,
                    latency_ms = tracing::field::Empty
                )
            })
            .on_request(|_request: &Request<_>, _span: &Span| {})
            .on_response(
                |response: &axum::response::Response, latency: Duration, span: &Span| {
                    span.record("status_code", response.status().as_u16());
                    let latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
                    span.record("latency_ms", latency_ms);
                },
            );
        let layered = ServiceBuilder::new()
            .layer(arias_telemetry::set_request_id_layer())
            .layer(arias_telemetry::propagate_request_id_layer())
            .layer(trace_layer)
            .layer(HttpMetricsLayer::new(telemetry));

        let router = Self::routes()
            .route_layer(layered)
            .with_state(Arc::new(state));
        Self { router }
    }

    fn routes() -> Router<Arc<ApiState>> {
        Router::new()
            .route("/download", post(submit_download))
            .route("/status/{id}", get(task_status))
            .route("/health", get(health))
            .route("/metrics", get(metrics))
    }

    /// The assembled router, for embedding or driving in-process.
    #[must_use]
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Bind `addr` and serve until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns [`ApiServerError::Bind`] if the address cannot be bound and
    /// [`ApiServerError::Serve`] if the server stops with an IO error.
    pub async fn serve<F>(self, addr: SocketAddr, shutdown: F) -> ApiServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ApiServerError::Bind { addr, source })?;
        self.serve_on(listener, shutdown).await
    }

    /// Serve on an already-bound listener until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns [`ApiServerError::Serve`] if the server stops with an IO error.
    pub async fn serve_on<F>(self, listener: TcpListener, shutdown: F) -> ApiServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Ok(local) = listener.local_addr() {
            info!(addr = %local, "api listening");
        }
        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|source| ApiServerError::Serve { source })
    }
}

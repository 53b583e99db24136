//! Health and metrics endpoints.

use std::sync::Arc;

use arias_telemetry::build_sha;
use axum::{Json, body::Body, extract::State, http::StatusCode, response::Response};
use tracing::{error, warn};

use crate::http::errors::ApiError;
use crate::models::HealthResponse;
use crate::state::ApiState;

pub(crate) async fn health(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<HealthResponse>, ApiError> {
    if !state.daemon.is_connected() {
        warn!("health check found the daemon connection closed");
        return Err(ApiError::service_unavailable(
            "download daemon connection is closed",
        ));
    }
    if state.executor.is_shutting_down() {
        return Err(ApiError::service_unavailable("service is shutting down"));
    }
    Ok(Json(HealthResponse {
        status: "ok",
        build: build_sha().to_string(),
        tasks: state.metrics.snapshot(),
    }))
}

pub(crate) async fn metrics(State(state): State<Arc<ApiState>>) -> Result<Response, ApiError> {
    match state.metrics.render() {
        Ok(body) => Response::builder()
            .status(StatusCode::OK)
            .header(
                axum::http::header::CONTENT_TYPE,
                "text/plain; version=0.0.4",
            )
            .body(Body::from(body))
            .map_err(|err| {
                error!(error = %err, "failed to build metrics response");
                ApiError::internal("failed to build metrics response")
            }),
        Err(err) => {
            error!(error = %err, "failed to render metrics");
            Err(ApiError::internal("failed to render metrics"))
        }
    }
}

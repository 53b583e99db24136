//! Download submission and task status endpoints.

use std::sync::Arc;

use arias_tasks::{DownloadRequest, TaskError, TaskStatus};
use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::http::errors::ApiError;
use crate::models::{DownloadBody, SubmitResponse};
use crate::state::ApiState;

pub(crate) async fn submit_download(
    State(state): State<Arc<ApiState>>,
    body: Result<Json<DownloadBody>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    let Json(body) = body.map_err(|rejection| {
        state.metrics.inc_task_rejected();
        ApiError::bad_request(rejection.body_text())
    })?;

    let bucket = state
        .policy
        .resolve(
            body.url.as_deref(),
            body.bucket.as_deref(),
            body.name.as_deref(),
        )
        .map_err(|violation| {
            state.metrics.inc_task_rejected();
            warn!(reason = %violation, "download request rejected");
            ApiError::rejected(violation.to_string())
        })?;

    let mut request = DownloadRequest::new(body.url.unwrap_or_default(), bucket);
    if let Some(name) = non_empty(body.name) {
        request = request.with_name(name);
    }
    if let Some(callback) = non_empty(body.callback) {
        request = request.with_callback(callback);
    }

    let task = state.factory.create(request);
    let id = state
        .executor
        .submit(task)
        .await
        .map_err(|err| match err {
            TaskError::ShuttingDown => ApiError::service_unavailable(err.to_string()),
            other => ApiError::internal(other.to_string()),
        })?;
    info!(task_id = %id, "download accepted");
    Ok((StatusCode::ACCEPTED, Json(SubmitResponse { id })))
}

pub(crate) async fn task_status(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Result<Json<TaskStatus>, ApiError> {
    let id = Uuid::parse_str(&id)
        .map_err(|_| ApiError::bad_request(format!("'{id}' is not a task identifier")))?;
    state
        .executor
        .status(id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("task {id} not found")))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

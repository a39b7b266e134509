//! Job submission and served-file handlers.

use super::{DeleteRequest, EnqueueRequest};
use crate::api::AppState;
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// POST /dl - Submit a URL for download
///
/// Responds once the dispatcher has accepted the job; progress arrives on `/events`.
#[utoipa::path(
    post,
    path = "/dl",
    tag = "jobs",
    request_body = EnqueueRequest,
    responses(
        (status = 202, description = "Job accepted"),
        (status = 400, description = "Empty or invalid URL", body = crate::error::ApiError),
        (status = 503, description = "Service is shutting down", body = crate::error::ApiError)
    )
)]
pub async fn enqueue_job(
    State(state): State<AppState>,
    Json(request): Json<EnqueueRequest>,
) -> Response {
    match state.service.enqueue(request.url.clone()).await {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(json!({"status": "queued", "URL": request.url})),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// DELETE /dl - Delete previously issued download links
#[utoipa::path(
    delete,
    path = "/dl",
    tag = "jobs",
    request_body = DeleteRequest,
    responses(
        (status = 204, description = "Files deleted"),
        (status = 400, description = "Malformed link", body = crate::error::ApiError),
        (status = 404, description = "File not found", body = crate::error::ApiError)
    )
)]
pub async fn delete_files(
    State(state): State<AppState>,
    Json(request): Json<DeleteRequest>,
) -> Response {
    match state.service.delete_files(&request.urls).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /recent - Finished files, newest first
#[utoipa::path(
    get,
    path = "/recent",
    tag = "jobs",
    responses(
        (status = 200, description = "Recent downloads", body = Vec<crate::types::RecentEntry>),
        (status = 500, description = "Output directory unreadable", body = crate::error::ApiError)
    )
)]
pub async fn recent_files(State(state): State<AppState>) -> Response {
    match state.service.recent().await {
        Ok(entries) => (StatusCode::OK, Json(entries)).into_response(),
        Err(e) => e.into_response(),
    }
}

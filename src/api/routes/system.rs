//! System handlers: health, OpenAPI, events.

use crate::api::AppState;
use crate::fanout::Subscription;
use axum::{
    Json,
    extract::State,
    response::{
        IntoResponse,
        sse::{Event as SseEvent, KeepAlive, Sse},
    },
};
use serde_json::json;
use std::convert::Infallible;
use tokio_stream::StreamExt;

/// GET /health - Health check
#[utoipa::path(
    get,
    path = "/health",
    tag = "system",
    responses(
        (status = 200, description = "Service is healthy")
    )
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "accepting": state.service.is_accepting(),
        "in_flight": state.service.in_flight(),
    }))
}

/// GET /openapi.json - OpenAPI specification
#[utoipa::path(
    get,
    path = "/openapi.json",
    tag = "system",
    responses(
        (status = 200, description = "OpenAPI specification in JSON format")
    )
)]
pub async fn openapi_spec() -> impl IntoResponse {
    use crate::api::openapi::ApiDoc;
    use utoipa::OpenApi;

    Json(ApiDoc::openapi())
}

/// GET /events - Server-sent events stream
///
/// Each SSE event is named after the event key and carries the `{"Key", "Value"}` JSON.
/// Delivery is at-most-once: a client that falls behind misses events.
#[utoipa::path(
    get,
    path = "/events",
    tag = "system",
    responses(
        (status = 200, description = "Server-sent events stream (text/event-stream)", content_type = "text/event-stream")
    )
)]
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl tokio_stream::Stream<Item = Result<SseEvent, Infallible>>> {
    let subscription = state.service.subscribe();
    tracing::debug!(subscriber = %subscription.id(), "event stream opened");

    // The subscription unregisters itself when the client disconnects and the stream drops.
    let events = futures::stream::unfold(subscription, |mut sub: Subscription| async move {
        sub.recv().await.map(|event| (event, sub))
    });

    let sse_stream = events.filter_map(|event| match serde_json::to_string(&event) {
        Ok(json_data) => Some(Ok(SseEvent::default()
            .event(event.key().as_str())
            .data(json_data))),
        Err(e) => {
            tracing::warn!(error = %e, "failed to serialize event");
            None
        }
    });

    let keep_alive = KeepAlive::new().interval(state.service.config().api.keep_alive);
    Sse::new(sse_stream).keep_alive(keep_alive)
}

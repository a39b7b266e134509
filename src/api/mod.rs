//! HTTP adapter
//!
//! A thin axum layer over [`YtdlService`]: job submission, deletion of issued links, the
//! recent-files listing and a server-sent event stream of every job event.

use crate::{Result, YtdlService};
use axum::{
    Router,
    http::HeaderValue,
    routing::{get, post},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod error_response;
pub mod openapi;
pub mod routes;
pub mod state;

pub use openapi::ApiDoc;
pub use state::AppState;

/// Create the API router
///
/// # Routes
///
/// - `POST /dl` - Submit a URL (`{"URL": "..."}`)
/// - `DELETE /dl` - Delete issued links (`{"URLs": [...]}`)
/// - `GET /recent` - Finished files, newest first
/// - `GET /events` - Server-sent events stream
/// - `GET /health` - Health check
/// - `GET /openapi.json` - OpenAPI specification
pub fn create_router(service: Arc<YtdlService>) -> Router {
    let api = service.config().api.clone();
    let state = AppState::new(service);

    let router = Router::new()
        .route("/dl", post(routes::enqueue_job).delete(routes::delete_files))
        .route("/recent", get(routes::recent_files))
        .route("/events", get(routes::event_stream))
        .route("/health", get(routes::health_check))
        .route("/openapi.json", get(routes::openapi_spec))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if api.cors_enabled {
        router.layer(build_cors_layer(&api.cors_origins))
    } else {
        router
    }
}

/// CORS layer for the configured origins; empty or `"*"` allows any origin
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_any = origins.iter().any(|o| o == "*");

    let layer = if allow_any || origins.is_empty() {
        CorsLayer::new().allow_origin(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        CorsLayer::new().allow_origin(AllowOrigin::list(allowed))
    };
    layer.allow_methods(Any).allow_headers(Any)
}

/// Serve the API on the configured bind address until the server stops
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use ytdl_web::{Config, YtdlService};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let service = Arc::new(YtdlService::new(Config::default()).await?);
/// service.start()?;
/// ytdl_web::api::start_api_server(service).await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_api_server(service: Arc<YtdlService>) -> Result<()> {
    let bind_address = service.config().api.bind_address;
    tracing::info!(address = %bind_address, "starting API server");

    let app = create_router(service);
    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(crate::error::Error::Io)?;

    tracing::info!(address = %bind_address, "API server listening");

    axum::serve(listener, app)
        .await
        .map_err(|e| crate::error::Error::ApiServerError(e.to_string()))?;

    tracing::info!("API server stopped");
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

//! OpenAPI documentation, generated at compile time with utoipa

use utoipa::OpenApi;

/// OpenAPI document for the HTTP adapter, served at `/openapi.json`
#[derive(OpenApi)]
#[openapi(
    info(
        title = "ytdl-web API",
        version = "0.1.0",
        description = "Submit media URLs for download and follow every job over server-sent events",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    paths(
        crate::api::routes::enqueue_job,
        crate::api::routes::delete_files,
        crate::api::routes::recent_files,
        crate::api::routes::health_check,
        crate::api::routes::openapi_spec,
        crate::api::routes::event_stream,
    ),
    components(
        schemas(
            crate::api::routes::EnqueueRequest,
            crate::api::routes::DeleteRequest,
            crate::types::JobId,
            crate::types::Job,
            crate::types::Progress,
            crate::types::Info,
            crate::types::StatusMsg,
            crate::types::Event,
            crate::types::EventKey,
            crate::types::RecentEntry,
            crate::error::ApiError,
            crate::error::ErrorDetail,
        )
    ),
    tags(
        (name = "jobs", description = "Job submission and served files"),
        (name = "system", description = "Health, events and API documentation")
    )
)]
pub struct ApiDoc;

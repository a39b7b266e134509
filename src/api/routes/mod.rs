//! Route handlers for the REST API
//!
//! - [`jobs`] - job submission, recent files, deletion
//! - [`system`] - health, events, OpenAPI

use serde::{Deserialize, Serialize};

mod jobs;
mod system;

pub use jobs::*;
pub use system::*;

/// Body of `POST /dl`
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct EnqueueRequest {
    /// Media URL to download
    #[serde(rename = "URL")]
    pub url: String,
}

/// Body of `DELETE /dl`
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct DeleteRequest {
    /// Previously issued download links
    #[serde(rename = "URLs")]
    pub urls: Vec<String>,
}

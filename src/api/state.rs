//! Application state for the API server

use crate::YtdlService;
use std::sync::Arc;

/// Shared state handed to every route handler (cheap to clone)
#[derive(Clone, Debug)]
pub struct AppState {
    /// The running service
    pub service: Arc<YtdlService>,
}

impl AppState {
    /// Create a new AppState
    pub fn new(service: Arc<YtdlService>) -> Self {
        Self { service }
    }
}

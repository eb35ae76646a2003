use std::sync::Arc;

use archdiffer_pipeline::service::ComparisonService;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
#[derive(Clone)]
pub struct AppState {
    /// Submission and polling façade over the Job Store and the dispatcher.
    pub service: Arc<ComparisonService>,
    pub config: Arc<ServerConfig>,
}

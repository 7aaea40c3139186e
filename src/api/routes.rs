//! API route definitions

use crate::models::ModelRegistry;
use crate::state::EngineState;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::handlers;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<EngineState>,
    pub models: Arc<ModelRegistry>,
    pub lang: String,
    pub workers: usize,
    pub max_body_bytes: usize,
    pub prometheus_handle: metrics_exporter_prometheus::PrometheusHandle,
}

/// Create the main API router
pub fn create_router(state: AppState) -> Router {
    let body_limit = state.max_body_bytes;

    Router::new()
        // Health and status
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        // OCR
        .route("/process-base64", post(handlers::process_base64))
        .route("/process", post(handlers::process_bytes))
        // Installed models
        .route("/models", get(handlers::list_models))
        .route("/models/{name}", get(handlers::get_model))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(DefaultBodyLimit::max(body_limit)),
        )
}

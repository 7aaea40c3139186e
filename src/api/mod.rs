//! HTTP API: OCR endpoints, health, model listing and metrics

pub mod handlers;
pub mod models;
pub mod routes;

pub use routes::{AppState, create_router};

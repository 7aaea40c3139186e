//! API request handlers

use super::models::{HealthResponse, OcrRequest, OcrResponse};
use super::routes::AppState;
use crate::error::{ApiError, OcrError, OcrResult};
use crate::imaging::{decode_base64_image, decode_image_bytes};
use crate::models::ModelEntry;
use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
};
use image::RgbImage;
use std::time::Instant;

/// GET /health - Service health and engine readiness
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        engine: "onnxruntime".to_string(),
        ready: state.engine.is_ready().await,
        engine_status: state.engine.status().await,
        lang: state.lang.clone(),
        workers: state.workers,
        timestamp: chrono::Utc::now(),
    })
}

/// GET /metrics - Prometheus metrics
pub async fn metrics(State(state): State<AppState>) -> String {
    state.prometheus_handle.render()
}

/// POST /process-base64 - OCR on a base64 or data-URL encoded image
pub async fn process_base64(
    State(state): State<AppState>,
    Json(req): Json<OcrRequest>,
) -> Result<Json<OcrResponse>, ApiError> {
    tracing::debug!(
        mime_type = ?req.mime_type,
        document_type = ?req.document_type,
        "OCR request received"
    );
    let start = Instant::now();
    let decoded = decode_base64_image(&req.image_base64);
    run_ocr(&state, start, decoded, req.document_type.as_deref()).await
}

/// POST /process - OCR on raw image bytes
pub async fn process_bytes(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<OcrResponse>, ApiError> {
    let start = Instant::now();
    let decoded = decode_image_bytes(&body);
    run_ocr(&state, start, decoded, None).await
}

/// GET /models - List known models and their install state
pub async fn list_models(State(state): State<AppState>) -> Json<Vec<ModelEntry>> {
    Json(state.models.list().await)
}

/// GET /models/{name} - Get a single model
pub async fn get_model(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ModelEntry>, ApiError> {
    state
        .models
        .get(&name)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Model '{}' not found", name)))
}

/// Run a decoded image through the engine pool
///
/// `start` is taken before decoding so the reported time covers the whole
/// request.
async fn run_ocr(
    state: &AppState,
    start: Instant,
    decoded: OcrResult<RgbImage>,
    document_type: Option<&str>,
) -> Result<Json<OcrResponse>, ApiError> {
    let pool = state.engine.pool().await.ok_or(OcrError::NotReady)?;

    let outcome = match decoded {
        Ok(image) => pool.run(image).await,
        Err(e) => Err(e),
    };
    let elapsed_ms = start.elapsed().as_millis() as u64;

    let response = match outcome {
        Ok(lines) => OcrResponse::from_lines(lines, elapsed_ms),
        Err(OcrError::Busy) => {
            crate::metrics::record_request("rejected", elapsed_ms, 0);
            return Err(OcrError::Busy.into());
        }
        Err(e) => {
            tracing::warn!(error = %e, elapsed_ms, "OCR failed");
            crate::metrics::record_request("failure", elapsed_ms, 0);
            return Ok(Json(OcrResponse::failure(e, elapsed_ms)));
        }
    };

    crate::metrics::record_request("success", elapsed_ms, response.lines.len());
    tracing::info!(
        lines = response.lines.len(),
        confidence = response.confidence,
        elapsed_ms,
        document_type = document_type.unwrap_or("-"),
        "OCR completed"
    );

    Ok(Json(response))
}

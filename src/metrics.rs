//! Prometheus metrics

use anyhow::Result;
use metrics_exporter_prometheus::PrometheusBuilder;

/// Setup Prometheus metrics exporter
/// Returns a handle that can be used to retrieve metrics
pub fn setup_metrics() -> Result<metrics_exporter_prometheus::PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

    tracing::info!("Prometheus metrics exporter installed");

    Ok(handle)
}

/// Record a finished OCR request
pub fn record_request(outcome: &'static str, elapsed_ms: u64, lines: usize) {
    metrics::counter!("ocr_service_requests_total", "outcome" => outcome).increment(1);
    metrics::histogram!("ocr_service_processing_ms").record(elapsed_ms as f64);
    metrics::histogram!("ocr_service_lines_per_request").record(lines as f64);
}

/// Record a model file download attempt
pub fn record_download(success: bool) {
    let outcome = if success { "success" } else { "failure" };
    metrics::counter!("ocr_service_model_downloads_total", "outcome" => outcome).increment(1);
}

/// Whether the engine is loaded and serving
pub fn set_engine_ready(ready: bool) {
    metrics::gauge!("ocr_service_engine_ready").set(if ready { 1.0 } else { 0.0 });
}

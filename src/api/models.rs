//! API request and response models

use crate::engine::{Quad, TextLine};
use crate::state::EngineStatus;
use serde::{Deserialize, Serialize};

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub engine: String,
    pub ready: bool,
    pub engine_status: EngineStatus,
    pub lang: String,
    pub workers: usize,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Request to run OCR on a base64-encoded image
#[derive(Debug, Serialize, Deserialize)]
pub struct OcrRequest {
    /// Raw base64 or a `data:<mime>;base64,` URL
    pub image_base64: String,

    #[serde(default = "default_mime_type")]
    pub mime_type: Option<String>,

    /// Free-form caller hint, logged only
    #[serde(default)]
    pub document_type: Option<String>,
}

fn default_mime_type() -> Option<String> {
    Some("image/jpeg".to_string())
}

/// A recognized line in the response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrLine {
    pub text: String,
    pub confidence: f64,
    #[serde(rename = "box")]
    pub bbox: Quad,
}

/// OCR result; failures are reported in-band with `success: false`
///
/// `error` is always present and `null` on success.
#[derive(Debug, Serialize, Deserialize)]
pub struct OcrResponse {
    pub success: bool,
    pub text: String,
    pub lines: Vec<OcrLine>,
    pub confidence: f64,
    pub processing_time_ms: u64,
    pub error: Option<String>,
}

impl OcrResponse {
    pub fn from_lines(lines: Vec<TextLine>, processing_time_ms: u64) -> Self {
        let confidence = if lines.is_empty() {
            0.0
        } else {
            round4(lines.iter().map(|l| l.confidence as f64).sum::<f64>() / lines.len() as f64)
        };

        let text = lines
            .iter()
            .map(|l| l.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let lines = lines
            .into_iter()
            .map(|l| OcrLine {
                confidence: round4(l.confidence as f64),
                text: l.text,
                bbox: l.bbox,
            })
            .collect();

        Self {
            success: true,
            text,
            lines,
            confidence,
            processing_time_ms,
            error: None,
        }
    }

    pub fn failure(error: impl std::fmt::Display, processing_time_ms: u64) -> Self {
        Self {
            success: false,
            text: String::new(),
            lines: Vec::new(),
            confidence: 0.0,
            processing_time_ms,
            error: Some(error.to_string()),
        }
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

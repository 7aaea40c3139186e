//! OCR Service - Text recognition over HTTP
//!
//! Serves PaddleOCR-format detection, angle classification and recognition
//! models through ONNX Runtime, downloading model archives on first start.

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod imaging;
pub mod metrics;
pub mod models;
pub mod state;

pub use config::{DownloadPolicy, ServiceConfig};
pub use engine::{EnginePool, OcrBackend, TextLine};
pub use error::{ApiError, OcrError, OcrResult};
pub use models::{ModelEntry, ModelRegistry, ModelStatus};
pub use state::{EngineState, EngineStatus};

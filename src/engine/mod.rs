//! In-process OCR engine
//!
//! A pipeline is a DB text detector, an optional 0/180 degree angle
//! classifier and a CTC recognizer, all running on ONNX Runtime. The
//! [`EnginePool`] holds one pipeline per configured worker.

pub mod classify;
pub mod detect;
pub mod pipeline;
pub mod pool;
pub mod recognize;
pub mod session;

use crate::error::OcrResult;
use image::RgbImage;
use serde::{Deserialize, Serialize};

pub use pipeline::{OcrPipeline, PackPaths};
pub use pool::EnginePool;

/// Four corners, clockwise from top-left, in source image pixels
pub type Quad = [[f32; 2]; 4];

/// One recognized line of text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextLine {
    pub text: String,
    pub confidence: f32,
    #[serde(rename = "box")]
    pub bbox: Quad,
}

/// Anything that turns an image into recognized text lines
///
/// Implementations are driven from a blocking thread and may hold
/// exclusive resources, hence `&mut self`.
pub trait OcrBackend: Send {
    fn recognize(&mut self, image: &RgbImage) -> OcrResult<Vec<TextLine>>;
}

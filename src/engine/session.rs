//! Helpers for working directly with ONNX Runtime sessions

use crate::error::{OcrError, OcrResult};
use ort::session::Session;
use ort::session::builder::GraphOptimizationLevel;
use ort::value::TensorRef;
use std::path::Path;

/// Load an ONNX model for CPU inference
pub fn load_session(model_path: &Path, intra_threads: usize) -> OcrResult<Session> {
    if !model_path.is_file() {
        return Err(OcrError::ModelMissing {
            name: model_path
                .parent()
                .and_then(|p| p.file_name())
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            path: model_path.to_path_buf(),
        });
    }

    let builder = Session::builder().map_err(|e| OcrError::model_load(model_path, e))?;
    let builder = builder
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| OcrError::model_load(model_path, e))?;
    let mut builder = builder
        .with_intra_threads(intra_threads)
        .map_err(|e| OcrError::model_load(model_path, e))?;
    let session = builder
        .commit_from_file(model_path)
        .map_err(|e| OcrError::model_load(model_path, e))?;

    tracing::debug!(model = ?model_path, intra_threads, "ONNX session loaded");
    Ok(session)
}

/// Run a single-input, single-output f32 model
///
/// Returns the first output's shape and data.
pub fn run_f32(
    session: &mut Session,
    shape: [usize; 4],
    data: &[f32],
) -> OcrResult<(Vec<usize>, Vec<f32>)> {
    let dims: Vec<i64> = shape.iter().map(|&d| d as i64).collect();
    let input = TensorRef::from_array_view((dims, data)).map_err(OcrError::inference)?;

    let outputs = session
        .run(ort::inputs![input])
        .map_err(OcrError::inference)?;

    let (out_shape, values) = outputs[0]
        .try_extract_tensor::<f32>()
        .map_err(OcrError::inference)?;

    let out_shape = out_shape.iter().map(|&d| d.max(0) as usize).collect();
    Ok((out_shape, values.to_vec()))
}

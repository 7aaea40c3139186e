//! Text line angle classifier (0 or 180 degrees)

use super::session::{load_session, run_f32};
use crate::error::{OcrError, OcrResult};
use crate::imaging::{Normalize, resize, write_chw};
use image::RgbImage;
use image::imageops;
use ort::session::Session;
use std::path::Path;

const CLS_HEIGHT: usize = 48;
const CLS_WIDTH: usize = 192;

pub struct AngleClassifier {
    session: Session,
    threshold: f32,
    batch_size: usize,
}

impl AngleClassifier {
    pub fn load(
        model_path: &Path,
        threshold: f32,
        batch_size: usize,
        intra_threads: usize,
    ) -> OcrResult<Self> {
        Ok(Self {
            session: load_session(model_path, intra_threads)?,
            threshold,
            batch_size: batch_size.max(1),
        })
    }

    /// Rotate upside-down crops in place; returns how many were flipped
    pub fn correct(&mut self, crops: &mut [RgbImage]) -> OcrResult<usize> {
        let slot = 3 * CLS_HEIGHT * CLS_WIDTH;
        let mut flipped = 0;

        for start in (0..crops.len()).step_by(self.batch_size) {
            let end = (start + self.batch_size).min(crops.len());
            let chunk = &crops[start..end];
            let mut input = vec![0.0f32; chunk.len() * slot];
            for (n, crop) in chunk.iter().enumerate() {
                let ratio = crop.width() as f32 / crop.height().max(1) as f32;
                let width = ((CLS_HEIGHT as f32 * ratio).ceil() as usize).clamp(1, CLS_WIDTH);
                let resized = resize(crop, width as u32, CLS_HEIGHT as u32);
                write_chw(
                    &resized,
                    &mut input[n * slot..(n + 1) * slot],
                    CLS_WIDTH,
                    CLS_HEIGHT,
                    Normalize::SYMMETRIC_BGR,
                );
            }

            let batch = chunk.len();
            let (shape, data) = run_f32(
                &mut self.session,
                [batch, 3, CLS_HEIGHT, CLS_WIDTH],
                &input,
            )?;
            if shape.len() != 2 || shape[0] != batch || shape[1] < 2 {
                return Err(OcrError::inference(format!(
                    "unexpected classifier output shape {:?}",
                    shape
                )));
            }

            let decisions: Vec<bool> = data
                .chunks_exact(shape[1])
                .map(|scores| needs_flip(scores, self.threshold))
                .collect();

            for (n, flip) in decisions.into_iter().enumerate() {
                if flip {
                    imageops::rotate180_in_place(&mut crops[start + n]);
                    flipped += 1;
                }
            }
        }

        Ok(flipped)
    }
}

/// Label 1 ("180") wins with enough confidence
fn needs_flip(scores: &[f32], threshold: f32) -> bool {
    scores.len() >= 2 && scores[1] > scores[0] && scores[1] >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_needs_flip() {
        assert!(needs_flip(&[0.02, 0.98], 0.9));
        assert!(!needs_flip(&[0.98, 0.02], 0.9));
        // upside down, but not confidently
        assert!(!needs_flip(&[0.3, 0.7], 0.9));
        assert!(!needs_flip(&[1.0], 0.9));
    }
}

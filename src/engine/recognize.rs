//! CTC text line recognizer

use super::session::{load_session, run_f32};
use crate::error::{OcrError, OcrResult};
use crate::imaging::{Normalize, resize, write_chw};
use image::RgbImage;
use ort::session::Session;
use std::path::Path;

const REC_HEIGHT: usize = 48;
const REC_MIN_WIDTH: usize = 320;
const REC_MAX_WIDTH: usize = 3200;

/// Greedy CTC decoder over a character dictionary
///
/// Index 0 is the blank token; the dictionary follows, then a space.
#[derive(Debug, Clone)]
pub struct CtcDecoder {
    characters: Vec<String>,
}

impl CtcDecoder {
    pub fn new<I, S>(dictionary: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut characters = vec![String::new()];
        characters.extend(dictionary.into_iter().map(Into::into));
        characters.push(" ".to_string());
        Self { characters }
    }

    /// Read a dictionary file with one symbol per line
    ///
    /// Lines map to class indices by position, so blank lines are kept.
    pub fn from_file(path: &Path) -> OcrResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| OcrError::model_load(path, format!("cannot read dictionary: {}", e)))?;
        let symbols: Vec<String> = content
            .lines()
            .map(|line| line.trim_end_matches('\r').to_string())
            .collect();
        if symbols.is_empty() {
            return Err(OcrError::model_load(path, "dictionary is empty"));
        }
        Ok(Self::new(symbols))
    }

    /// Number of classes including blank and space
    pub fn num_classes(&self) -> usize {
        self.characters.len()
    }

    /// Decode one sequence of `steps x classes` probabilities
    ///
    /// Repeated indices collapse, blanks are dropped. The confidence is the
    /// mean probability of the kept steps, 0 when nothing was kept.
    pub fn decode(&self, probs: &[f32], classes: usize) -> (String, f32) {
        let mut text = String::new();
        let mut total = 0.0f32;
        let mut kept = 0usize;
        let mut previous: Option<usize> = None;

        for step in probs.chunks_exact(classes) {
            let (index, prob) = step
                .iter()
                .copied()
                .enumerate()
                .fold((0, f32::MIN), |best, (i, p)| if p > best.1 { (i, p) } else { best });

            let repeated = previous == Some(index);
            previous = Some(index);
            if index == 0 || repeated {
                continue;
            }

            if let Some(symbol) = self.characters.get(index) {
                text.push_str(symbol);
                total += prob;
                kept += 1;
            }
        }

        let confidence = if kept > 0 { total / kept as f32 } else { 0.0 };
        (text, confidence)
    }
}

pub struct CtcRecognizer {
    session: Session,
    decoder: CtcDecoder,
    batch_size: usize,
}

impl CtcRecognizer {
    pub fn load(
        model_path: &Path,
        dict_path: &Path,
        batch_size: usize,
        intra_threads: usize,
    ) -> OcrResult<Self> {
        Ok(Self {
            session: load_session(model_path, intra_threads)?,
            decoder: CtcDecoder::from_file(dict_path)?,
            batch_size: batch_size.max(1),
        })
    }

    /// Recognize text line crops, results in input order
    pub fn recognize(&mut self, crops: &[RgbImage]) -> OcrResult<Vec<(String, f32)>> {
        let mut results = vec![(String::new(), 0.0f32); crops.len()];

        // batching similar aspect ratios keeps padding small
        let mut order: Vec<usize> = (0..crops.len()).collect();
        order.sort_by(|&a, &b| aspect_ratio(&crops[a]).total_cmp(&aspect_ratio(&crops[b])));

        for chunk in order.chunks(self.batch_size) {
            let max_ratio = chunk
                .iter()
                .map(|&i| aspect_ratio(&crops[i]))
                .fold(REC_MIN_WIDTH as f32 / REC_HEIGHT as f32, f32::max);
            let batch_width = ((REC_HEIGHT as f32 * max_ratio).ceil() as usize).min(REC_MAX_WIDTH);

            let slot = 3 * REC_HEIGHT * batch_width;
            let mut input = vec![0.0f32; chunk.len() * slot];
            for (n, &i) in chunk.iter().enumerate() {
                let resized = resize_to_height(&crops[i], batch_width);
                write_chw(
                    &resized,
                    &mut input[n * slot..(n + 1) * slot],
                    batch_width,
                    REC_HEIGHT,
                    Normalize::SYMMETRIC_BGR,
                );
            }

            let (shape, data) = run_f32(
                &mut self.session,
                [chunk.len(), 3, REC_HEIGHT, batch_width],
                &input,
            )?;
            if shape.len() != 3 || shape[0] != chunk.len() {
                return Err(OcrError::inference(format!(
                    "unexpected recognizer output shape {:?}",
                    shape
                )));
            }

            let (steps, classes) = (shape[1], shape[2]);
            for (n, &i) in chunk.iter().enumerate() {
                let start = n * steps * classes;
                results[i] = self
                    .decoder
                    .decode(&data[start..start + steps * classes], classes);
            }
        }

        Ok(results)
    }
}

fn aspect_ratio(image: &RgbImage) -> f32 {
    image.width() as f32 / image.height().max(1) as f32
}

/// Scale to the recognizer height, width capped at `max_width`
fn resize_to_height(image: &RgbImage, max_width: usize) -> RgbImage {
    let width = ((REC_HEIGHT as f32 * aspect_ratio(image)).ceil() as usize).clamp(1, max_width);
    resize(image, width as u32, REC_HEIGHT as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_hot(indices: &[usize], classes: usize, p: f32) -> Vec<f32> {
        let mut probs = vec![0.0; indices.len() * classes];
        for (step, &i) in indices.iter().enumerate() {
            probs[step * classes + i] = p;
        }
        probs
    }

    #[test]
    fn test_decoder_layout() {
        let decoder = CtcDecoder::new(["a", "b", "c"]);
        // blank + 3 + space
        assert_eq!(decoder.num_classes(), 5);
    }

    #[test]
    fn test_collapse_repeats_and_blanks() {
        let decoder = CtcDecoder::new(["h", "e", "l", "o"]);
        // h h blank e l l blank l o
        let probs = one_hot(&[1, 1, 0, 2, 3, 3, 0, 3, 4], 6, 0.9);
        let (text, confidence) = decoder.decode(&probs, 6);
        assert_eq!(text, "hello");
        assert!((confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_space_token() {
        let decoder = CtcDecoder::new(["a", "b"]);
        let probs = one_hot(&[1, 3, 2], 4, 0.8);
        assert_eq!(decoder.decode(&probs, 4).0, "a b");
    }

    #[test]
    fn test_all_blank_has_zero_confidence() {
        let decoder = CtcDecoder::new(["a"]);
        let probs = one_hot(&[0, 0, 0], 3, 0.99);
        assert_eq!(decoder.decode(&probs, 3), (String::new(), 0.0));
    }

    #[test]
    fn test_out_of_dictionary_index_skipped() {
        let decoder = CtcDecoder::new(["a"]);
        // model has more classes than the dictionary knows
        let probs = one_hot(&[1, 5], 6, 0.7);
        assert_eq!(decoder.decode(&probs, 6).0, "a");
    }

    #[test]
    fn test_from_file_keeps_blank_lines_in_place() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("dict.txt");
        std::fs::write(&path, "a\r\nb\n\nc\n").unwrap();

        let decoder = CtcDecoder::from_file(&path).unwrap();
        // blank + a, b, "", c + space
        assert_eq!(decoder.num_classes(), 6);
        assert_eq!(decoder.decode(&one_hot(&[1], 6, 1.0), 6).0, "a");
        assert_eq!(decoder.decode(&one_hot(&[3], 6, 1.0), 6).0, "");
        assert_eq!(decoder.decode(&one_hot(&[4], 6, 1.0), 6).0, "c");
        assert_eq!(decoder.decode(&one_hot(&[5], 6, 1.0), 6).0, " ");
    }

    #[test]
    fn test_from_file_empty_dictionary() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("dict.txt");
        std::fs::write(&path, "").unwrap();
        assert!(CtcDecoder::from_file(&path).is_err());
    }

    #[test]
    fn test_resize_to_height_caps_width() {
        let wide = RgbImage::new(1000, 10);
        let resized = resize_to_height(&wide, 320);
        assert_eq!(resized.dimensions(), (320, 48));

        let small = RgbImage::new(24, 48);
        assert_eq!(resize_to_height(&small, 320).dimensions(), (24, 48));
    }
}

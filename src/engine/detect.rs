//! DB (Differentiable Binarization) text detector
//!
//! The model outputs a per-pixel text probability map. Post-processing
//! binarizes it, traces outer contours, scores each candidate box against the
//! probability map and expands ("unclips") the survivors before mapping them
//! back to source coordinates.

use super::Quad;
use super::session::{load_session, run_f32};
use crate::config::DetectionConfig;
use crate::error::{OcrError, OcrResult};
use crate::imaging::{Normalize, resize, write_chw};
use image::{GrayImage, Luma, RgbImage};
use imageproc::contours::{BorderType, find_contours};
use ndarray::{Array2, s};
use ort::session::Session;
use std::path::Path;

/// Boxes with a shorter side than this (in model pixels) are noise
const MIN_BOX_SIDE: f32 = 3.0;

pub struct DbDetector {
    session: Session,
    config: DetectionConfig,
}

impl DbDetector {
    pub fn load(model_path: &Path, config: DetectionConfig, intra_threads: usize) -> OcrResult<Self> {
        Ok(Self {
            session: load_session(model_path, intra_threads)?,
            config,
        })
    }

    /// Detect text regions, returned in source image coordinates
    pub fn detect(&mut self, image: &RgbImage) -> OcrResult<Vec<Quad>> {
        let (width, height) =
            detection_size(image.width(), image.height(), self.config.limit_side_len);
        let resized = resize(image, width, height);

        let (w, h) = (width as usize, height as usize);
        let mut input = vec![0.0f32; 3 * w * h];
        write_chw(&resized, &mut input, w, h, Normalize::IMAGENET_BGR);

        let (shape, data) = run_f32(&mut self.session, [1, 3, h, w], &input)?;
        if shape.len() != 4 {
            return Err(OcrError::inference(format!(
                "unexpected detector output shape {:?}",
                shape
            )));
        }
        let (map_h, map_w) = (shape[2], shape[3]);
        let pred = Array2::from_shape_vec((map_h, map_w), data[..map_h * map_w].to_vec())
            .map_err(OcrError::inference)?;

        Ok(boxes_from_prob_map(
            &pred,
            &self.config,
            image.width(),
            image.height(),
        ))
    }
}

/// Model input size: longest side capped at `limit`, both sides multiples of 32
pub fn detection_size(width: u32, height: u32, limit: u32) -> (u32, u32) {
    let longest = width.max(height) as f32;
    let ratio = if longest > limit as f32 {
        limit as f32 / longest
    } else {
        1.0
    };

    let round32 = |side: u32| -> u32 {
        let scaled = (side as f32 * ratio / 32.0).round() as u32 * 32;
        scaled.max(32)
    };

    (round32(width), round32(height))
}

/// Turn a probability map into scored, unclipped boxes in destination coordinates
pub fn boxes_from_prob_map(
    pred: &Array2<f32>,
    config: &DetectionConfig,
    dest_width: u32,
    dest_height: u32,
) -> Vec<Quad> {
    let (height, width) = pred.dim();
    if height == 0 || width == 0 {
        return Vec::new();
    }

    let mut bitmap = GrayImage::new(width as u32, height as u32);
    for ((y, x), &p) in pred.indexed_iter() {
        if p > config.db_thresh {
            bitmap.put_pixel(x as u32, y as u32, Luma([255]));
        }
    }

    let width_scale = dest_width as f32 / width as f32;
    let height_scale = dest_height as f32 / height as f32;
    let mut boxes = Vec::new();

    let contours = find_contours::<i32>(&bitmap)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer)
        .take(config.max_candidates);

    for contour in contours {
        let Some((x0, y0, x1, y1)) = bounds(contour.points.iter().map(|p| (p.x, p.y))) else {
            continue;
        };

        let box_w = (x1 - x0 + 1) as f32;
        let box_h = (y1 - y0 + 1) as f32;
        if box_w.min(box_h) < MIN_BOX_SIDE {
            continue;
        }

        let score = pred
            .slice(s![y0 as usize..=y1 as usize, x0 as usize..=x1 as usize])
            .mean()
            .unwrap_or(0.0);
        if score < config.db_box_thresh {
            continue;
        }

        let distance = box_w * box_h * config.db_unclip_ratio / (2.0 * (box_w + box_h));
        let (ux0, uy0) = (x0 as f32 - distance, y0 as f32 - distance);
        let (ux1, uy1) = (x1 as f32 + 1.0 + distance, y1 as f32 + 1.0 + distance);
        if (ux1 - ux0).min(uy1 - uy0) < MIN_BOX_SIDE + 2.0 {
            continue;
        }

        let sx = |x: f32| (x * width_scale).round().clamp(0.0, dest_width as f32);
        let sy = |y: f32| (y * height_scale).round().clamp(0.0, dest_height as f32);
        let (left, top, right, bottom) = (sx(ux0), sy(uy0), sx(ux1), sy(uy1));

        boxes.push([[left, top], [right, top], [right, bottom], [left, bottom]]);
    }

    boxes
}

fn bounds(points: impl Iterator<Item = (i32, i32)>) -> Option<(i32, i32, i32, i32)> {
    points.fold(None, |acc, (x, y)| match acc {
        None => Some((x, y, x, y)),
        Some((x0, y0, x1, y1)) => Some((x0.min(x), y0.min(y), x1.max(x), y1.max(y))),
    })
}

//! Image ingestion and tensor layout helpers

use crate::error::{OcrError, OcrResult};
use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use image::RgbImage;
use image::imageops::{self, FilterType};

/// Standard alphabet, padding optional
const BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Per-channel normalization applied while laying out a tensor
#[derive(Debug, Clone, Copy)]
pub struct Normalize {
    pub mean: [f32; 3],
    pub std: [f32; 3],
    /// Feed channels as B, G, R instead of R, G, B
    pub bgr: bool,
}

impl Normalize {
    /// ImageNet statistics, channels in BGR order (detector input)
    pub const IMAGENET_BGR: Normalize = Normalize {
        mean: [0.485, 0.456, 0.406],
        std: [0.229, 0.224, 0.225],
        bgr: true,
    };

    /// Maps [0, 255] onto [-1, 1] (recognizer and classifier input)
    pub const SYMMETRIC_BGR: Normalize = Normalize {
        mean: [0.5, 0.5, 0.5],
        std: [0.5, 0.5, 0.5],
        bgr: true,
    };
}

/// Decode a base64 payload, optionally wrapped in a data URL, into RGB pixels
///
/// Anything up to and including the first `,` is treated as a data-URL
/// header and dropped. Embedded whitespace is ignored.
pub fn decode_base64_image(raw: &str) -> OcrResult<RgbImage> {
    let payload = match raw.split_once(',') {
        Some((_, data)) => data,
        None => raw,
    };

    let cleaned: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    if cleaned.is_empty() {
        return Err(OcrError::InvalidImage("empty image payload".to_string()));
    }

    let bytes = BASE64
        .decode(cleaned.as_bytes())
        .map_err(|e| OcrError::InvalidImage(format!("base64 decode failed: {}", e)))?;

    decode_image_bytes(&bytes)
}

/// Decode encoded image bytes (PNG, JPEG, ...) into RGB pixels
pub fn decode_image_bytes(bytes: &[u8]) -> OcrResult<RgbImage> {
    if bytes.is_empty() {
        return Err(OcrError::InvalidImage("empty image payload".to_string()));
    }

    let image = image::load_from_memory(bytes)
        .map_err(|e| OcrError::InvalidImage(format!("cannot decode image: {}", e)))?;

    let rgb = image.to_rgb8();
    if rgb.width() == 0 || rgb.height() == 0 {
        return Err(OcrError::InvalidImage("image has no pixels".to_string()));
    }
    Ok(rgb)
}

pub fn resize(image: &RgbImage, width: u32, height: u32) -> RgbImage {
    if image.width() == width && image.height() == height {
        return image.clone();
    }
    imageops::resize(image, width.max(1), height.max(1), FilterType::Triangle)
}

/// Write `image` into one CHW slot of a batch tensor
///
/// `plane_w` may exceed the image width; the remainder of each row is left
/// untouched (zero padding when `dst` was zero-initialised).
pub fn write_chw(image: &RgbImage, dst: &mut [f32], plane_w: usize, plane_h: usize, norm: Normalize) {
    let plane = plane_w * plane_h;
    let width = (image.width() as usize).min(plane_w);
    let height = (image.height() as usize).min(plane_h);

    for y in 0..height {
        for x in 0..width {
            let pixel = image.get_pixel(x as u32, y as u32);
            for c in 0..3 {
                let src = if norm.bgr { 2 - c } else { c };
                let value = pixel[src] as f32 / 255.0;
                dst[c * plane + y * plane_w + x] = (value - norm.mean[c]) / norm.std[c];
            }
        }
    }
}

/// Crop the axis-aligned bounds of a quadrilateral, clamped to the image
///
/// Returns `None` when the clamped region is empty.
pub fn crop_quad(image: &RgbImage, quad: &[[f32; 2]; 4]) -> Option<RgbImage> {
    let (mut min_x, mut min_y) = (f32::MAX, f32::MAX);
    let (mut max_x, mut max_y) = (f32::MIN, f32::MIN);
    for [x, y] in quad {
        min_x = min_x.min(*x);
        min_y = min_y.min(*y);
        max_x = max_x.max(*x);
        max_y = max_y.max(*y);
    }

    let x0 = min_x.floor().max(0.0) as u32;
    let y0 = min_y.floor().max(0.0) as u32;
    let x1 = (max_x.ceil().max(0.0) as u32).min(image.width());
    let y1 = (max_y.ceil().max(0.0) as u32).min(image.height());
    if x1 <= x0 || y1 <= y0 {
        return None;
    }

    let crop = imageops::crop_imm(image, x0, y0, x1 - x0, y1 - y0).to_image();

    // tall crops are vertical text
    if crop.height() as f32 / crop.width() as f32 >= 1.5 {
        Some(imageops::rotate270(&crop))
    } else {
        Some(crop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb};
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let image = RgbImage::from_pixel(width, height, Rgb([10, 20, 30]));
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_decode_plain_base64() {
        let encoded = base64::engine::general_purpose::STANDARD.encode(png_bytes(4, 3));
        let image = decode_base64_image(&encoded).unwrap();
        assert_eq!(image.dimensions(), (4, 3));
        assert_eq!(image.get_pixel(0, 0), &Rgb([10, 20, 30]));
    }

    #[test]
    fn test_decode_data_url() {
        let encoded = base64::engine::general_purpose::STANDARD.encode(png_bytes(2, 2));
        let data_url = format!("data:image/png;base64,{}", encoded);
        assert!(decode_base64_image(&data_url).is_ok());
    }

    #[test]
    fn test_decode_tolerates_whitespace_and_missing_padding() {
        let encoded = base64::engine::general_purpose::STANDARD_NO_PAD.encode(png_bytes(3, 3));
        let wrapped: String = encoded
            .as_bytes()
            .chunks(16)
            .map(|c| std::str::from_utf8(c).unwrap())
            .collect::<Vec<_>>()
            .join("\n");
        assert!(decode_base64_image(&wrapped).is_ok());
    }

    #[test]
    fn test_decode_rejects_bad_input() {
        assert!(matches!(
            decode_base64_image(""),
            Err(OcrError::InvalidImage(_))
        ));
        assert!(matches!(
            decode_base64_image("data:image/png;base64,"),
            Err(OcrError::InvalidImage(_))
        ));
        assert!(matches!(
            decode_base64_image("!!!not base64!!!"),
            Err(OcrError::InvalidImage(_))
        ));

        // valid base64, not an image
        let encoded = base64::engine::general_purpose::STANDARD.encode(b"hello world");
        let err = decode_base64_image(&encoded).unwrap_err();
        assert!(err.to_string().contains("cannot decode image"));
    }

    #[test]
    fn test_write_chw_bgr_and_padding() {
        let image = RgbImage::from_pixel(2, 1, Rgb([255, 0, 0]));
        let mut dst = vec![0.0f32; 3 * 4];
        write_chw(&image, &mut dst, 4, 1, Normalize::SYMMETRIC_BGR);

        // channel 0 is blue
        assert_eq!(&dst[0..4], &[-1.0, -1.0, 0.0, 0.0]);
        // channel 2 is red
        assert_eq!(&dst[8..12], &[1.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_crop_quad_clamps() {
        let image = RgbImage::new(100, 50);
        let quad = [[90.0, 10.0], [130.0, 10.0], [130.0, 14.0], [90.0, 14.0]];
        let crop = crop_quad(&image, &quad).unwrap();
        assert_eq!(crop.dimensions(), (10, 4));
    }

    #[test]
    fn test_crop_quad_rotates_vertical_text() {
        let image = RgbImage::new(100, 100);
        let quad = [[10.0, 0.0], [20.0, 0.0], [20.0, 40.0], [10.0, 40.0]];
        let crop = crop_quad(&image, &quad).unwrap();
        assert_eq!(crop.dimensions(), (40, 10));
    }

    #[test]
    fn test_crop_quad_outside_image() {
        let image = RgbImage::new(10, 10);
        let quad = [[20.0, 20.0], [30.0, 20.0], [30.0, 30.0], [20.0, 30.0]];
        assert!(crop_quad(&image, &quad).is_none());
    }
}

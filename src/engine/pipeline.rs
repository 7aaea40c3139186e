//! Detect → classify → recognize pipeline

use super::classify::AngleClassifier;
use super::detect::DbDetector;
use super::recognize::CtcRecognizer;
use super::{OcrBackend, Quad, TextLine};
use crate::config::ServiceConfig;
use crate::error::OcrResult;
use crate::imaging::crop_quad;
use crate::models::{ModelPack, dict_file, model_file, target_dir};
use image::RgbImage;
use std::path::{Path, PathBuf};

/// Boxes whose tops differ by less than this share a line
const LINE_TOLERANCE: f32 = 10.0;

/// Model directories for one language
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackPaths {
    pub det: PathBuf,
    pub rec: PathBuf,
    pub cls: Option<PathBuf>,
}

impl PackPaths {
    pub fn resolve(home: &Path, pack: &ModelPack, with_cls: bool) -> Self {
        Self {
            det: target_dir(home, &pack.det),
            rec: target_dir(home, &pack.rec),
            cls: with_cls.then(|| target_dir(home, &pack.cls)),
        }
    }
}

pub struct OcrPipeline {
    detector: DbDetector,
    classifier: Option<AngleClassifier>,
    recognizer: CtcRecognizer,
    drop_score: f32,
}

impl OcrPipeline {
    pub fn load(paths: &PackPaths, config: &ServiceConfig) -> OcrResult<Self> {
        let threads = config.intra_threads;
        let rec = &config.recognition;

        let detector = DbDetector::load(&model_file(&paths.det), config.detection.clone(), threads)?;
        let classifier = paths
            .cls
            .as_ref()
            .map(|dir| AngleClassifier::load(&model_file(dir), rec.cls_thresh, rec.batch_size, threads))
            .transpose()?;
        let recognizer = CtcRecognizer::load(
            &model_file(&paths.rec),
            &dict_file(&paths.rec),
            rec.batch_size,
            threads,
        )?;

        Ok(Self {
            detector,
            classifier,
            recognizer,
            drop_score: rec.drop_score,
        })
    }
}

impl OcrBackend for OcrPipeline {
    fn recognize(&mut self, image: &RgbImage) -> OcrResult<Vec<TextLine>> {
        let quads = sort_quads(self.detector.detect(image)?);

        let (quads, mut crops): (Vec<Quad>, Vec<RgbImage>) = quads
            .into_iter()
            .filter_map(|quad| crop_quad(image, &quad).map(|crop| (quad, crop)))
            .unzip();
        if crops.is_empty() {
            return Ok(Vec::new());
        }

        if let Some(classifier) = self.classifier.as_mut() {
            let flipped = classifier.correct(&mut crops)?;
            tracing::debug!(flipped, total = crops.len(), "Angle classification done");
        }

        let recognized = self.recognizer.recognize(&crops)?;

        Ok(quads
            .into_iter()
            .zip(recognized)
            .filter(|(_, (text, confidence))| !text.is_empty() && *confidence >= self.drop_score)
            .map(|(bbox, (text, confidence))| TextLine {
                text,
                confidence,
                bbox,
            })
            .collect())
    }
}

/// Order boxes top-to-bottom, then left-to-right within a line
pub fn sort_quads(mut quads: Vec<Quad>) -> Vec<Quad> {
    quads.sort_by(|a, b| {
        a[0][1]
            .total_cmp(&b[0][1])
            .then_with(|| a[0][0].total_cmp(&b[0][0]))
    });

    for i in 0..quads.len().saturating_sub(1) {
        for j in (0..=i).rev() {
            let same_line = (quads[j + 1][0][1] - quads[j][0][1]).abs() < LINE_TOLERANCE;
            if same_line && quads[j + 1][0][0] < quads[j][0][0] {
                quads.swap(j, j + 1);
            } else {
                break;
            }
        }
    }

    quads
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::catalog::{CatalogSources, pack_for};

    fn quad(x: f32, y: f32) -> Quad {
        [[x, y], [x + 20.0, y], [x + 20.0, y + 10.0], [x, y + 10.0]]
    }

    #[test]
    fn test_sort_same_line_left_to_right() {
        // second box sits slightly higher but further right
        let sorted = sort_quads(vec![quad(100.0, 12.0), quad(10.0, 15.0), quad(50.0, 40.0)]);
        let origins: Vec<_> = sorted.iter().map(|q| (q[0][0], q[0][1])).collect();
        assert_eq!(origins, vec![(10.0, 15.0), (100.0, 12.0), (50.0, 40.0)]);
    }

    #[test]
    fn test_sort_distinct_lines_top_to_bottom() {
        let sorted = sort_quads(vec![quad(0.0, 100.0), quad(300.0, 0.0), quad(0.0, 50.0)]);
        let tops: Vec<_> = sorted.iter().map(|q| q[0][1]).collect();
        assert_eq!(tops, vec![0.0, 50.0, 100.0]);
    }

    #[test]
    fn test_sort_empty_and_single() {
        assert!(sort_quads(Vec::new()).is_empty());
        assert_eq!(sort_quads(vec![quad(1.0, 1.0)]).len(), 1);
    }

    #[test]
    fn test_pack_paths() {
        let pack = pack_for("en", &CatalogSources::default()).unwrap();
        let home = Path::new("/m");

        let paths = PackPaths::resolve(home, &pack, false);
        assert!(paths.cls.is_none());
        assert_eq!(paths.det, PathBuf::from("/m/whl/det/en/en_PP-OCRv3_det_infer"));

        let paths = PackPaths::resolve(home, &pack, true);
        assert_eq!(
            paths.cls,
            Some(PathBuf::from("/m/whl/cls/ch_ppocr_mobile_v2.0_cls_infer"))
        );
    }

    #[test]
    fn test_load_fails_without_models() {
        let temp_dir = tempfile::tempdir().unwrap();
        let pack = pack_for("fr", &CatalogSources::default()).unwrap();
        let paths = PackPaths::resolve(temp_dir.path(), &pack, true);

        let result = OcrPipeline::load(&paths, &ServiceConfig::default());
        assert!(matches!(
            result,
            Err(crate::error::OcrError::ModelMissing { .. })
        ));
    }
}

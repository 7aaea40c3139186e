//! Built-in catalog of model packs per language
//!
//! Every language needs three models: a text detector, a recognizer (with
//! its character dictionary) and the shared angle classifier. Latin-script
//! languages share the multilingual detector and the `latin` recognizer.
//!
//! Weights are the ONNX exports of the PaddleOCR models published by the
//! RapidOCR project, laid out as `<base>/{det,rec,cls}/<name>.onnx`.

use crate::error::{OcrError, OcrResult};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL_BASE_URL: &str =
    "https://www.modelscope.cn/models/RapidAI/RapidOCR/resolve/v3.2.0/onnx/PP-OCRv4";
pub const DEFAULT_DICT_BASE_URL: &str =
    "https://raw.githubusercontent.com/PaddlePaddle/PaddleOCR/release/2.7/ppocr/utils";

/// Path prefix of the ONNX tree inside a Hub mirror of the RapidOCR repository
pub const HUB_MODEL_PREFIX: &str = "onnx/PP-OCRv4";

const CLS_MODEL: &str = "ch_ppocr_mobile_v2.0_cls_infer";

/// (language, detector, detector dir, recognizer, recognizer dir, dictionary)
const LANGUAGES: &[(&str, &str, &str, &str, &str, &str)] = &[
    (
        "en",
        "en_PP-OCRv3_det_infer",
        "en",
        "en_PP-OCRv4_rec_infer",
        "en",
        "en_dict.txt",
    ),
    (
        "ch",
        "ch_PP-OCRv4_det_infer",
        "ch",
        "ch_PP-OCRv4_rec_infer",
        "ch",
        "ppocr_keys_v1.txt",
    ),
    (
        "fr",
        "Multilingual_PP-OCRv3_det_infer",
        "ml",
        "latin_PP-OCRv3_rec_infer",
        "latin",
        "dict/latin_dict.txt",
    ),
    (
        "de",
        "Multilingual_PP-OCRv3_det_infer",
        "ml",
        "latin_PP-OCRv3_rec_infer",
        "latin",
        "dict/latin_dict.txt",
    ),
    (
        "es",
        "Multilingual_PP-OCRv3_det_infer",
        "ml",
        "latin_PP-OCRv3_rec_infer",
        "latin",
        "dict/latin_dict.txt",
    ),
    (
        "it",
        "Multilingual_PP-OCRv3_det_infer",
        "ml",
        "latin_PP-OCRv3_rec_infer",
        "latin",
        "dict/latin_dict.txt",
    ),
    (
        "pt",
        "Multilingual_PP-OCRv3_det_infer",
        "ml",
        "latin_PP-OCRv3_rec_infer",
        "latin",
        "dict/latin_dict.txt",
    ),
];

/// Role of a model inside the OCR pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Text region detector
    Det,
    /// Text line recognizer
    Rec,
    /// Text line angle classifier (0 / 180 degrees)
    Cls,
}

impl ModelKind {
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::Det => "det",
            Self::Rec => "rec",
            Self::Cls => "cls",
        }
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Where a model's weights come from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModelSource {
    /// A bare `.onnx` file fetched over HTTP(S)
    File { url: String },
    /// A `.tar` archive carrying `inference.onnx`, fetched over HTTP(S)
    Archive { url: String },
    /// A single ONNX file in a HuggingFace Hub repository
    Hub { repo: String, file: String },
}

/// A single pretrained model and where to fetch it from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelArchive {
    pub kind: ModelKind,
    pub name: String,
    /// Language subdirectory; the angle classifier is language independent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lang_dir: Option<String>,
    pub source: ModelSource,
    /// Character dictionary, recognizers only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dict_url: Option<String>,
}

/// Everything required to serve one language
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelPack {
    pub lang: String,
    pub det: ModelArchive,
    pub rec: ModelArchive,
    pub cls: ModelArchive,
}

impl ModelPack {
    /// Archives to install; the classifier is skipped when angle classification is off
    pub fn archives(&self, with_cls: bool) -> Vec<&ModelArchive> {
        let mut archives = vec![&self.det, &self.rec];
        if with_cls {
            archives.push(&self.cls);
        }
        archives
    }
}

/// Base locations models are resolved against
///
/// A Hub repo wins over an archive mirror, which wins over the plain ONNX
/// file host.
#[derive(Debug, Clone)]
pub struct CatalogSources {
    /// Directory holding `{det,rec,cls}/<name>.onnx`
    pub model_base_url: String,
    /// Self-hosted mirror serving `<name>.tar` archives that contain `inference.onnx`
    pub archive_base_url: Option<String>,
    pub dict_base_url: String,
    /// Hub repo mirroring the RapidOCR tree under [`HUB_MODEL_PREFIX`]
    pub hub_repo: Option<String>,
}

impl Default for CatalogSources {
    fn default() -> Self {
        Self {
            model_base_url: DEFAULT_MODEL_BASE_URL.to_string(),
            archive_base_url: None,
            dict_base_url: DEFAULT_DICT_BASE_URL.to_string(),
            hub_repo: None,
        }
    }
}

impl CatalogSources {
    fn archive(&self, kind: ModelKind, name: &str, lang_dir: Option<&str>) -> ModelArchive {
        let source = if let Some(repo) = &self.hub_repo {
            ModelSource::Hub {
                repo: repo.clone(),
                file: format!("{}/{}/{}.onnx", HUB_MODEL_PREFIX, kind.dir_name(), name),
            }
        } else if let Some(base) = &self.archive_base_url {
            ModelSource::Archive {
                url: format!("{}/{}.tar", base.trim_end_matches('/'), name),
            }
        } else {
            ModelSource::File {
                url: format!(
                    "{}/{}/{}.onnx",
                    self.model_base_url.trim_end_matches('/'),
                    kind.dir_name(),
                    name
                ),
            }
        };

        ModelArchive {
            kind,
            name: name.to_string(),
            lang_dir: lang_dir.map(str::to_string),
            source,
            dict_url: None,
        }
    }
}

/// Languages with a built-in model pack
pub fn supported_languages() -> Vec<&'static str> {
    LANGUAGES.iter().map(|entry| entry.0).collect()
}

pub fn is_supported(lang: &str) -> bool {
    LANGUAGES.iter().any(|entry| entry.0 == lang)
}

/// Resolve the model pack for a language
pub fn pack_for(lang: &str, sources: &CatalogSources) -> OcrResult<ModelPack> {
    let (_, det_name, det_dir, rec_name, rec_dir, dict) = LANGUAGES
        .iter()
        .find(|entry| entry.0 == lang)
        .ok_or_else(|| OcrError::UnsupportedLanguage {
            lang: lang.to_string(),
            supported: supported_languages().join(", "),
        })?;

    let det = sources.archive(ModelKind::Det, det_name, Some(det_dir));
    let mut rec = sources.archive(ModelKind::Rec, rec_name, Some(rec_dir));
    rec.dict_url = Some(format!(
        "{}/{}",
        sources.dict_base_url.trim_end_matches('/'),
        dict
    ));
    let cls = sources.archive(ModelKind::Cls, CLS_MODEL, None);

    Ok(ModelPack {
        lang: lang.to_string(),
        det,
        rec,
        cls,
    })
}

/// Every distinct archive across all languages, in catalog order
pub fn all_archives(sources: &CatalogSources) -> Vec<ModelArchive> {
    let mut archives: Vec<ModelArchive> = Vec::new();
    for lang in supported_languages() {
        if let Ok(pack) = pack_for(lang, sources) {
            for archive in pack.archives(true) {
                if !archives.iter().any(|a| a == archive) {
                    archives.push(archive.clone());
                }
            }
        }
    }
    archives
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_french_pack_uses_latin_recognizer() {
        let pack = pack_for("fr", &CatalogSources::default()).unwrap();
        assert_eq!(pack.det.name, "Multilingual_PP-OCRv3_det_infer");
        assert_eq!(pack.det.lang_dir.as_deref(), Some("ml"));
        assert_eq!(pack.rec.name, "latin_PP-OCRv3_rec_infer");
        assert_eq!(pack.rec.lang_dir.as_deref(), Some("latin"));
        assert_eq!(pack.cls.name, "ch_ppocr_mobile_v2.0_cls_infer");
        assert!(pack.cls.lang_dir.is_none());
        assert_eq!(
            pack.rec.dict_url.as_deref(),
            Some(
                "https://raw.githubusercontent.com/PaddlePaddle/PaddleOCR/release/2.7/ppocr/utils/dict/latin_dict.txt"
            )
        );
    }

    #[test]
    fn test_default_sources_are_onnx_files() {
        let pack = pack_for("fr", &CatalogSources::default()).unwrap();
        let base = "https://www.modelscope.cn/models/RapidAI/RapidOCR/resolve/v3.2.0/onnx/PP-OCRv4";

        let expected = [
            (&pack.det, "det/Multilingual_PP-OCRv3_det_infer.onnx"),
            (&pack.rec, "rec/latin_PP-OCRv3_rec_infer.onnx"),
            (&pack.cls, "cls/ch_ppocr_mobile_v2.0_cls_infer.onnx"),
        ];
        for (archive, file) in expected {
            assert_eq!(
                archive.source,
                ModelSource::File {
                    url: format!("{}/{}", base, file)
                }
            );
        }
    }

    #[test]
    fn test_default_file_names_per_language() {
        let sources = CatalogSources::default();
        let names = |lang: &str| {
            let pack = pack_for(lang, &sources).unwrap();
            (pack.det.name, pack.rec.name)
        };

        assert_eq!(
            names("en"),
            (
                "en_PP-OCRv3_det_infer".to_string(),
                "en_PP-OCRv4_rec_infer".to_string()
            )
        );
        assert_eq!(
            names("ch"),
            (
                "ch_PP-OCRv4_det_infer".to_string(),
                "ch_PP-OCRv4_rec_infer".to_string()
            )
        );
        for lang in ["fr", "de", "es", "it", "pt"] {
            assert_eq!(
                names(lang),
                (
                    "Multilingual_PP-OCRv3_det_infer".to_string(),
                    "latin_PP-OCRv3_rec_infer".to_string()
                )
            );
        }
    }

    #[test]
    fn test_archive_mirror_trailing_slash() {
        let sources = CatalogSources {
            archive_base_url: Some("http://mirror.local/ocr/".to_string()),
            ..Default::default()
        };
        let pack = pack_for("ch", &sources).unwrap();
        assert_eq!(
            pack.rec.source,
            ModelSource::Archive {
                url: "http://mirror.local/ocr/ch_PP-OCRv4_rec_infer.tar".to_string()
            }
        );
    }

    #[test]
    fn test_hub_sources() {
        let sources = CatalogSources {
            hub_repo: Some("acme/ocr-onnx".to_string()),
            archive_base_url: Some("http://mirror.local".to_string()),
            ..Default::default()
        };
        let pack = pack_for("en", &sources).unwrap();
        assert_eq!(
            pack.cls.source,
            ModelSource::Hub {
                repo: "acme/ocr-onnx".to_string(),
                file: "onnx/PP-OCRv4/cls/ch_ppocr_mobile_v2.0_cls_infer.onnx".to_string()
            }
        );
        assert!(pack.rec.dict_url.is_some());
    }

    #[test]
    fn test_unknown_language() {
        let err = pack_for("xx", &CatalogSources::default()).unwrap_err();
        assert!(matches!(err, OcrError::UnsupportedLanguage { .. }));
        assert!(err.to_string().contains("fr"));
    }

    #[test]
    fn test_archives_without_cls() {
        let pack = pack_for("de", &CatalogSources::default()).unwrap();
        assert_eq!(pack.archives(true).len(), 3);
        let kinds: Vec<_> = pack.archives(false).iter().map(|a| a.kind).collect();
        assert_eq!(kinds, vec![ModelKind::Det, ModelKind::Rec]);
    }

    #[test]
    fn test_all_archives_deduplicated() {
        let archives = all_archives(&CatalogSources::default());
        // en det/rec, ch det/rec, multilingual det, latin rec, shared cls
        assert_eq!(archives.len(), 7);
        let cls_count = archives.iter().filter(|a| a.kind == ModelKind::Cls).count();
        assert_eq!(cls_count, 1);
    }
}

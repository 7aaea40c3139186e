//! On-disk model layout
//!
//! Installed models live under the model home in the layout the engine
//! expects:
//! ```text
//! $OCR_MODEL_HOME/whl/
//! ├── det/
//! │   └── ml/Multilingual_PP-OCRv3_det_infer/inference.onnx
//! ├── rec/
//! │   └── latin/latin_PP-OCRv3_rec_infer/
//! │       ├── inference.onnx
//! │       └── dict.txt
//! └── cls/
//!     └── ch_ppocr_mobile_v2.0_cls_infer/inference.onnx
//! ```

use super::catalog::{ModelArchive, ModelKind};
use std::path::{Path, PathBuf};

pub const MODEL_FILE: &str = "inference.onnx";
pub const DICT_FILE: &str = "dict.txt";

/// Directory an archive is extracted into
pub fn target_dir(home: &Path, archive: &ModelArchive) -> PathBuf {
    let mut dir = home.join("whl").join(archive.kind.dir_name());
    if let Some(lang_dir) = &archive.lang_dir {
        dir.push(lang_dir);
    }
    dir.join(&archive.name)
}

/// Path of the ONNX weights inside a model directory
pub fn model_file(dir: &Path) -> PathBuf {
    dir.join(MODEL_FILE)
}

/// Path of the character dictionary inside a recognizer directory
pub fn dict_file(dir: &Path) -> PathBuf {
    dir.join(DICT_FILE)
}

/// Check if an archive is fully installed
///
/// Recognizers also need their dictionary next to the weights.
pub fn is_installed(home: &Path, archive: &ModelArchive) -> bool {
    let dir = target_dir(home, archive);
    if !model_file(&dir).is_file() {
        return false;
    }
    archive.kind != ModelKind::Rec || dict_file(&dir).is_file()
}

/// Get the total size of an installed model in bytes
pub fn get_install_size(home: &Path, archive: &ModelArchive) -> Option<u64> {
    let dir = target_dir(home, archive);
    if !dir.exists() {
        return None;
    }
    Some(dir_size(&dir))
}

/// Recursively calculate directory size
fn dir_size(path: &Path) -> u64 {
    let mut size = 0;

    if let Ok(entries) = std::fs::read_dir(path) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                size += dir_size(&path);
            } else if let Ok(metadata) = std::fs::metadata(&path) {
                size += metadata.len();
            }
        }
    }

    size
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::catalog::{CatalogSources, pack_for};

    #[test]
    fn test_target_dirs_follow_engine_layout() {
        let home = Path::new("/models");
        let pack = pack_for("fr", &CatalogSources::default()).unwrap();

        assert_eq!(
            target_dir(home, &pack.det),
            PathBuf::from("/models/whl/det/ml/Multilingual_PP-OCRv3_det_infer")
        );
        assert_eq!(
            target_dir(home, &pack.rec),
            PathBuf::from("/models/whl/rec/latin/latin_PP-OCRv3_rec_infer")
        );
        assert_eq!(
            target_dir(home, &pack.cls),
            PathBuf::from("/models/whl/cls/ch_ppocr_mobile_v2.0_cls_infer")
        );
    }

    #[test]
    fn test_is_installed_requires_weights() {
        let temp_dir = tempfile::tempdir().unwrap();
        let pack = pack_for("en", &CatalogSources::default()).unwrap();
        assert!(!is_installed(temp_dir.path(), &pack.det));

        let dir = target_dir(temp_dir.path(), &pack.det);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(model_file(&dir), b"onnx").unwrap();
        assert!(is_installed(temp_dir.path(), &pack.det));
    }

    #[test]
    fn test_recognizer_requires_dict() {
        let temp_dir = tempfile::tempdir().unwrap();
        let pack = pack_for("en", &CatalogSources::default()).unwrap();
        let dir = target_dir(temp_dir.path(), &pack.rec);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(model_file(&dir), b"onnx").unwrap();
        assert!(!is_installed(temp_dir.path(), &pack.rec));

        std::fs::write(dict_file(&dir), "a\nb\n").unwrap();
        assert!(is_installed(temp_dir.path(), &pack.rec));
    }

    #[test]
    fn test_install_size() {
        let temp_dir = tempfile::tempdir().unwrap();
        let pack = pack_for("en", &CatalogSources::default()).unwrap();
        assert!(get_install_size(temp_dir.path(), &pack.cls).is_none());

        let dir = target_dir(temp_dir.path(), &pack.cls);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(model_file(&dir), "hello world").unwrap();
        assert_eq!(get_install_size(temp_dir.path(), &pack.cls), Some(11));
    }

    #[test]
    fn test_dir_size_nested_dirs() {
        let temp_dir = tempfile::tempdir().unwrap();

        let subdir = temp_dir.path().join("subdir");
        std::fs::create_dir(&subdir).unwrap();
        std::fs::write(subdir.join("file1.txt"), "abc").unwrap();
        std::fs::write(temp_dir.path().join("file2.txt"), "defgh").unwrap();

        assert_eq!(dir_size(temp_dir.path()), 8);
    }
}

//! Model management module
//!
//! Provides functionality for:
//! - Resolving the model pack (detector, recognizer, angle classifier) for a language
//! - Mapping archives onto the on-disk layout the engine expects
//! - Downloading and extracting archives, or fetching ONNX files from the Hub
//! - Tracking install status (available, downloading, installed, failed)

pub mod cache;
pub mod catalog;
pub mod download;
pub mod registry;

pub use cache::{dict_file, is_installed, model_file, target_dir};
pub use catalog::{CatalogSources, ModelArchive, ModelKind, ModelPack, ModelSource, pack_for};
pub use download::{Downloader, extract_archive};
pub use registry::{ModelEntry, ModelRegistry, ModelStatus};

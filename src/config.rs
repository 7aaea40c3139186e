//! Configuration structures and loading logic

use crate::models::catalog::{self, CatalogSources};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// When missing model archives are fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DownloadPolicy {
    /// Fetch anything missing when the server starts
    OnStartup,
    /// Models must already be present (fetched at image build time)
    Never,
}

impl std::str::FromStr for DownloadPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on-startup" | "on_startup" | "startup" => Ok(Self::OnStartup),
            "never" | "build" => Ok(Self::Never),
            other => anyhow::bail!("Unknown download policy '{}'", other),
        }
    }
}

/// Main service configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub model_home: PathBuf,
    pub lang: String,
    pub use_angle_cls: bool,
    pub workers: usize,
    pub max_pending_requests: usize,
    pub intra_threads: usize,
    pub download_policy: DownloadPolicy,
    pub download_retries: u32,
    pub download_timeout_secs: u64,
    pub max_body_bytes: usize,
    /// Host serving `{det,rec,cls}/<name>.onnx`
    pub model_base_url: String,
    /// Self-hosted mirror of `<name>.tar` archives containing `inference.onnx`
    pub archive_base_url: Option<String>,
    pub dict_base_url: String,
    /// Fetch ONNX weights from this HuggingFace Hub repo instead
    pub hub_repo: Option<String>,
    pub detection: DetectionConfig,
    pub recognition: RecognitionConfig,
}

/// Text detector tuning
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct DetectionConfig {
    pub limit_side_len: u32,
    pub db_thresh: f32,
    pub db_box_thresh: f32,
    pub db_unclip_ratio: f32,
    pub max_candidates: usize,
}

/// Recognizer and angle classifier tuning
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RecognitionConfig {
    pub drop_score: f32,
    pub cls_thresh: f32,
    pub batch_size: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            model_home: default_model_home(),
            lang: "fr".to_string(),
            use_angle_cls: true,
            workers: 1,
            max_pending_requests: 64,
            intra_threads: 1,
            download_policy: DownloadPolicy::OnStartup,
            download_retries: 2,
            download_timeout_secs: 600,
            max_body_bytes: 20 * 1024 * 1024,
            model_base_url: catalog::DEFAULT_MODEL_BASE_URL.to_string(),
            archive_base_url: None,
            dict_base_url: catalog::DEFAULT_DICT_BASE_URL.to_string(),
            hub_repo: None,
            detection: DetectionConfig::default(),
            recognition: RecognitionConfig::default(),
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            limit_side_len: 960,
            db_thresh: 0.3,
            db_box_thresh: 0.6,
            db_unclip_ratio: 1.5,
            max_candidates: 1000,
        }
    }
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            drop_score: 0.5,
            cls_thresh: 0.9,
            batch_size: 6,
        }
    }
}

impl ServiceConfig {
    /// Load configuration from file with environment variable overrides
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content).context("Failed to parse TOML config")?
        } else {
            Self::default()
        };

        config.apply_env()?;

        Ok(config)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(port) = std::env::var("OCR_SERVICE_PORT") {
            self.port = port.parse().context("Invalid OCR_SERVICE_PORT value")?;
        }
        if let Some(home) = model_home_from_env() {
            self.model_home = home;
        }
        if let Ok(lang) = std::env::var("OCR_LANG") {
            self.lang = lang;
        }
        if let Ok(workers) = std::env::var("OCR_WORKERS") {
            self.workers = workers.parse().context("Invalid OCR_WORKERS value")?;
        }
        if let Ok(policy) = std::env::var("OCR_DOWNLOAD_POLICY") {
            self.download_policy = policy.parse()?;
        }
        if let Ok(flag) = std::env::var("OCR_USE_ANGLE_CLS") {
            self.use_angle_cls = matches!(
                flag.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
        Ok(())
    }

    /// Base locations the model catalog resolves against
    pub fn catalog_sources(&self) -> CatalogSources {
        CatalogSources {
            model_base_url: self.model_base_url.clone(),
            archive_base_url: self.archive_base_url.clone(),
            dict_base_url: self.dict_base_url.clone(),
            hub_repo: self.hub_repo.clone(),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.port < 1024 {
            anyhow::bail!("Port must be >= 1024 (got {})", self.port);
        }

        if self.workers == 0 || self.workers > 16 {
            anyhow::bail!("Workers must be between 1 and 16 (got {})", self.workers);
        }
        if self.max_pending_requests < self.workers {
            anyhow::bail!(
                "max_pending_requests ({}) must be >= workers ({})",
                self.max_pending_requests,
                self.workers
            );
        }
        if self.intra_threads == 0 {
            anyhow::bail!("intra_threads must be >= 1");
        }
        if self.recognition.batch_size == 0 {
            anyhow::bail!("recognition.batch_size must be >= 1");
        }

        if !catalog::is_supported(&self.lang) {
            anyhow::bail!(
                "Unsupported language '{}' (supported: {})",
                self.lang,
                catalog::supported_languages().join(", ")
            );
        }

        let unit = [
            ("detection.db_thresh", self.detection.db_thresh),
            ("detection.db_box_thresh", self.detection.db_box_thresh),
            ("recognition.drop_score", self.recognition.drop_score),
            ("recognition.cls_thresh", self.recognition.cls_thresh),
        ];
        for (name, value) in unit {
            if !(0.0..1.0).contains(&value) {
                anyhow::bail!("{} must be in [0, 1) (got {})", name, value);
            }
        }
        if self.detection.db_unclip_ratio <= 0.0 {
            anyhow::bail!("detection.db_unclip_ratio must be positive");
        }
        if self.detection.limit_side_len < 32 {
            anyhow::bail!("detection.limit_side_len must be >= 32");
        }

        if !self.model_home.exists() {
            std::fs::create_dir_all(&self.model_home).with_context(|| {
                format!("Cannot create model home directory: {:?}", self.model_home)
            })?;
        }

        Ok(())
    }
}

/// Model cache directory from the environment
///
/// `OCR_MODEL_HOME` wins over the engine-compatible `PADDLEOCR_HOME`.
pub fn model_home_from_env() -> Option<PathBuf> {
    std::env::var("OCR_MODEL_HOME")
        .or_else(|_| std::env::var("PADDLEOCR_HOME"))
        .ok()
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn default_model_home() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".paddleocr"))
        .unwrap_or_else(|| PathBuf::from("/tmp/paddleocr"))
}

//! Model registry for tracking model archives and their install status

use super::cache::{get_install_size, is_installed, target_dir};
use super::catalog::{ModelArchive, ModelKind, ModelPack};
use super::download::Downloader;
use crate::error::{OcrError, OcrResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Status of a model archive in the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStatus {
    /// Known but not on disk
    Available,
    /// Currently being downloaded
    Downloading,
    /// Extracted into the model home
    Installed,
    /// Last install attempt failed
    Failed,
}

impl std::fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Available => write!(f, "available"),
            Self::Downloading => write!(f, "downloading"),
            Self::Installed => write!(f, "installed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Entry for a model archive in the registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEntry {
    pub name: String,
    pub kind: ModelKind,
    pub status: ModelStatus,
    /// Directory the archive is (or will be) extracted into
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installed_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    archive: Option<ModelArchive>,
}

impl ModelEntry {
    fn new(home: &std::path::Path, archive: &ModelArchive) -> Self {
        let mut entry = Self {
            name: archive.name.clone(),
            kind: archive.kind,
            status: ModelStatus::Available,
            path: target_dir(home, archive),
            size_bytes: None,
            error: None,
            installed_at: None,
            archive: Some(archive.clone()),
        };
        entry.refresh(home);
        entry
    }

    /// Re-read install state from disk
    fn refresh(&mut self, home: &std::path::Path) {
        let Some(archive) = &self.archive else {
            return;
        };

        if is_installed(home, archive) {
            self.size_bytes = get_install_size(home, archive);
            if self.status != ModelStatus::Downloading {
                self.status = ModelStatus::Installed;
            }
        } else if self.status == ModelStatus::Installed {
            self.size_bytes = None;
            self.status = ModelStatus::Available;
        }
    }
}

/// Registry for tracking model archives under one model home
pub struct ModelRegistry {
    home: PathBuf,
    downloader: Downloader,
    models: Arc<RwLock<HashMap<String, ModelEntry>>>,
}

impl ModelRegistry {
    /// Create a new empty registry
    pub fn new(home: PathBuf, downloader: Downloader) -> Self {
        Self {
            home,
            downloader,
            models: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn home(&self) -> &std::path::Path {
        &self.home
    }

    /// Register every archive of a pack
    pub async fn add_pack(&self, pack: &ModelPack, with_cls: bool) {
        for archive in pack.archives(with_cls) {
            self.add_model(archive).await;
        }
    }

    /// Add an archive to the registry
    pub async fn add_model(&self, archive: &ModelArchive) -> ModelEntry {
        let mut models = self.models.write().await;
        let entry = models
            .entry(archive.name.clone())
            .or_insert_with(|| ModelEntry::new(&self.home, archive));
        entry.clone()
    }

    /// Get a model entry by name
    pub async fn get(&self, name: &str) -> Option<ModelEntry> {
        let models = self.models.read().await;
        models.get(name).cloned()
    }

    /// List all models
    pub async fn list(&self) -> Vec<ModelEntry> {
        let models = self.models.read().await;
        let mut entries: Vec<_> = models.values().cloned().collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }

    /// Refresh install state for all models
    pub async fn refresh_all(&self) {
        let mut models = self.models.write().await;
        for entry in models.values_mut() {
            entry.refresh(&self.home);
        }
    }

    /// Names of archives in the pack that are not on disk
    pub async fn missing(&self, pack: &ModelPack, with_cls: bool) -> Vec<String> {
        pack.archives(with_cls)
            .into_iter()
            .filter(|archive| !is_installed(&self.home, archive))
            .map(|archive| archive.name.clone())
            .collect()
    }

    /// Install every missing archive of a pack
    ///
    /// Archives are fetched one at a time; the first failure aborts.
    pub async fn ensure_pack(&self, pack: &ModelPack, with_cls: bool) -> OcrResult<()> {
        self.add_pack(pack, with_cls).await;

        for archive in pack.archives(with_cls) {
            self.ensure(archive).await?;
        }

        Ok(())
    }

    /// Install a single archive if it is missing
    pub async fn ensure(&self, archive: &ModelArchive) -> OcrResult<PathBuf> {
        self.add_model(archive).await;

        if is_installed(&self.home, archive) {
            tracing::debug!(model = %archive.name, "Model already installed");
            self.set_status(&archive.name, ModelStatus::Installed, None)
                .await;
            return Ok(target_dir(&self.home, archive));
        }

        self.set_status(&archive.name, ModelStatus::Downloading, None)
            .await;

        match self.downloader.install(&self.home, archive).await {
            Ok(dir) => {
                self.set_status(&archive.name, ModelStatus::Installed, None)
                    .await;
                Ok(dir)
            }
            Err(e) => {
                tracing::error!(model = %archive.name, error = %e, "Model install failed");
                self.set_status(&archive.name, ModelStatus::Failed, Some(e.to_string()))
                    .await;
                Err(e)
            }
        }
    }

    /// Require every archive of a pack to already be installed
    pub async fn require_pack(&self, pack: &ModelPack, with_cls: bool) -> OcrResult<()> {
        self.add_pack(pack, with_cls).await;

        for archive in pack.archives(with_cls) {
            if !is_installed(&self.home, archive) {
                let path = target_dir(&self.home, archive);
                self.set_status(
                    &archive.name,
                    ModelStatus::Failed,
                    Some("not installed and downloads are disabled".to_string()),
                )
                .await;
                return Err(OcrError::ModelMissing {
                    name: archive.name.clone(),
                    path,
                });
            }
        }

        Ok(())
    }

    async fn set_status(&self, name: &str, status: ModelStatus, error: Option<String>) {
        let mut models = self.models.write().await;
        if let Some(entry) = models.get_mut(name) {
            entry.status = status;
            entry.error = error;
            if status == ModelStatus::Installed {
                if entry.installed_at.is_none() {
                    entry.installed_at = Some(Utc::now());
                }
                entry.refresh(&self.home);
            }
        }
    }
}

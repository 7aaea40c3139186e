//! Engine lifecycle: model provisioning and the shared engine slot
//!
//! The HTTP listener comes up before the engine does, so `/health` can
//! report progress while models download and load in the background.

use crate::config::{DownloadPolicy, ServiceConfig};
use crate::engine::{EnginePool, PackPaths};
use crate::error::{OcrError, OcrResult};
use crate::models::{ModelPack, ModelRegistry};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Where the engine is in its startup sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum EngineStatus {
    Starting,
    Downloading,
    Loading,
    Ready,
    Failed { error: String },
}

/// Shared slot holding the engine once it is loaded
pub struct EngineState {
    pool: RwLock<Option<Arc<EnginePool>>>,
    status: RwLock<EngineStatus>,
}

impl EngineState {
    pub fn new() -> Self {
        Self {
            pool: RwLock::new(None),
            status: RwLock::new(EngineStatus::Starting),
        }
    }

    /// An already-loaded engine
    pub fn with_pool(pool: EnginePool) -> Self {
        Self {
            pool: RwLock::new(Some(Arc::new(pool))),
            status: RwLock::new(EngineStatus::Ready),
        }
    }

    pub async fn pool(&self) -> Option<Arc<EnginePool>> {
        self.pool.read().await.clone()
    }

    pub async fn status(&self) -> EngineStatus {
        self.status.read().await.clone()
    }

    pub async fn is_ready(&self) -> bool {
        self.pool.read().await.is_some()
    }

    pub async fn set_status(&self, status: EngineStatus) {
        tracing::debug!(status = ?status, "Engine status changed");
        *self.status.write().await = status;
    }

    async fn install(&self, pool: EnginePool) {
        *self.pool.write().await = Some(Arc::new(pool));
        self.set_status(EngineStatus::Ready).await;
        crate::metrics::set_engine_ready(true);
    }

    /// Acquire models according to the download policy, then load the engine
    pub async fn provision(
        &self,
        registry: &ModelRegistry,
        pack: &ModelPack,
        config: &ServiceConfig,
    ) -> OcrResult<()> {
        let result = self.try_provision(registry, pack, config).await;
        if let Err(e) = &result {
            tracing::error!(error = %e, "Engine provisioning failed");
            self.set_status(EngineStatus::Failed {
                error: e.to_string(),
            })
            .await;
            crate::metrics::set_engine_ready(false);
        }
        result
    }

    async fn try_provision(
        &self,
        registry: &ModelRegistry,
        pack: &ModelPack,
        config: &ServiceConfig,
    ) -> OcrResult<()> {
        let with_cls = config.use_angle_cls;

        match config.download_policy {
            DownloadPolicy::OnStartup => {
                let missing = registry.missing(pack, with_cls).await;
                if !missing.is_empty() {
                    tracing::info!(lang = %pack.lang, models = ?missing, "Downloading missing models");
                    self.set_status(EngineStatus::Downloading).await;
                }
                registry.ensure_pack(pack, with_cls).await?;
            }
            DownloadPolicy::Never => registry.require_pack(pack, with_cls).await?,
        }

        self.set_status(EngineStatus::Loading).await;
        let paths = PackPaths::resolve(registry.home(), pack, with_cls);
        let load_config = config.clone();
        let pool = tokio::task::spawn_blocking(move || EnginePool::load(&paths, &load_config))
            .await
            .map_err(OcrError::inference)??;

        tracing::info!(
            lang = %pack.lang,
            workers = pool.size(),
            angle_cls = with_cls,
            "OCR engine ready"
        );
        self.install(pool).await;
        Ok(())
    }
}

impl Default for EngineState {
    fn default() -> Self {
        Self::new()
    }
}

//! Facade over locator, loader and registry exposing health, predict and reload.

use crate::error::ServingError;
use crate::integrity::{self, Fingerprint};
use crate::loader::{self, LoadedArtifact};
use crate::locator::ArtifactLocator;
use crate::metrics::{record_active, serving_metrics};
use crate::model::{ProductId, UserId};
use crate::recommend::{recommend, Reason, DEFAULT_LIMIT};
use crate::registry::{ModelRegistry, ServingState};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

/// Body of `/health` and `/reload`. The top-level size/digest fields describe
/// the file as it is on disk now (health) or as it was loaded (reload); the
/// `loaded_*` fields always describe the active model.
#[derive(Debug, Clone, Serialize)]
pub struct ModelReport {
    pub status: &'static str,
    pub model_type: String,
    pub model_path: String,
    pub model_size_bytes: Option<u64>,
    pub model_sha256: Option<String>,
    pub model_sha256_short: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_mtime_utc: Option<DateTime<Utc>>,
    pub model_generation: u64,
    pub loaded_sha256: Option<String>,
    pub loaded_size_bytes: Option<u64>,
    pub loaded_at_utc: DateTime<Utc>,
    pub artifact_changed: bool,
}

impl ModelReport {
    fn new(status: &'static str, state: &ServingState, on_disk: Fingerprint) -> Self {
        let artifact_changed = matches!((&on_disk.sha256, &state.metadata.sha256), (Some(now), Some(loaded)) if now != loaded);
        Self {
            status,
            model_type: state.model.model_type.clone(),
            model_path: state.path.display().to_string(),
            model_size_bytes: on_disk.size_bytes,
            model_sha256_short: on_disk.sha256.as_deref().map(|h| integrity::short_digest(h).to_string()),
            model_sha256: on_disk.sha256,
            model_mtime_utc: on_disk.mtime_utc,
            model_generation: state.generation,
            loaded_sha256: state.metadata.sha256.clone(),
            loaded_size_bytes: state.metadata.size_bytes,
            loaded_at_utc: state.metadata.loaded_at,
            artifact_changed,
        }
    }

    fn as_loaded(status: &'static str, state: &ServingState) -> Self {
        let at_load = Fingerprint {
            size_bytes: state.metadata.size_bytes,
            sha256: state.metadata.sha256.clone(),
            mtime_utc: state.metadata.mtime_utc,
        };
        Self::new(status, state, at_load)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Prediction {
    pub user_id: UserId,
    pub recommendations: Vec<ProductId>,
    pub reason: Reason,
}

pub struct ModelService {
    locator: ArtifactLocator,
    registry: ModelRegistry,
    // queues whole locate/load/swap pipelines; readers never take it
    reload_lock: Mutex<()>,
}

impl ModelService {
    pub fn new(locator: ArtifactLocator) -> Self {
        Self { locator, registry: ModelRegistry::new(), reload_lock: Mutex::new(()) }
    }

    /// Builds the service and performs the startup load. No model, no service.
    pub async fn start(locator: ArtifactLocator) -> Result<Arc<Self>, ServingError> {
        let svc = Self::new(locator);
        svc.initialize().await?;
        Ok(Arc::new(svc))
    }

    pub async fn initialize(&self) -> Result<Arc<ServingState>, ServingError> {
        let _serialized = self.reload_lock.lock().await;
        let (path, loaded) = self.prepare().await?;
        let state = self.registry.initialize(path, loaded.model, loaded.metadata)?;
        record_active(&state);
        info!(path = %state.path.display(), sha256_short = ?state.metadata.sha256_short(), size_bytes = ?state.metadata.size_bytes,
            model_type = %state.model.model_type, "initial model loaded");
        Ok(state)
    }

    /// Locate and load off the async workers; nothing here touches the registry.
    async fn prepare(&self) -> Result<(PathBuf, LoadedArtifact), ServingError> {
        let path = self.locator.resolve_path().await?;
        let load_path = path.clone();
        let loaded = tokio::task::spawn_blocking(move || loader::load_artifact(&load_path))
            .await
            .map_err(|e| ServingError::malformed(&path, format!("loader task failed: {e}")))??;
        Ok((path, loaded))
    }

    pub fn registry(&self) -> &ModelRegistry { &self.registry }

    pub fn locator(&self) -> &ArtifactLocator { &self.locator }

    pub fn current(&self) -> Result<Arc<ServingState>, ServingError> { self.registry.get() }

    /// Active model metadata plus a fresh, uncached fingerprint of the file on disk.
    #[instrument(skip(self))]
    pub async fn health(&self) -> Result<ModelReport, ServingError> {
        let state = self.registry.get()?;
        let path = state.path.clone();
        let on_disk = tokio::task::spawn_blocking(move || integrity::fingerprint(&path)).await.unwrap_or_default();
        Ok(ModelReport::new("ok", &state, on_disk))
    }

    #[instrument(skip(self))]
    pub fn predict(&self, user_id: UserId) -> Result<Prediction, ServingError> {
        let state = self.registry.get()?;
        let rec = recommend(&state.model, user_id, DEFAULT_LIMIT);
        serving_metrics().predict_total.with_label_values(&[rec.reason.as_str()]).inc();
        Ok(Prediction { user_id, recommendations: rec.products, reason: rec.reason })
    }

    /// Builds a complete new state first, then swaps. On any failure the
    /// active model is left exactly as it was.
    #[instrument(skip(self))]
    pub async fn reload(&self) -> Result<ModelReport, ServingError> {
        let _serialized = self.reload_lock.lock().await;
        let started = Instant::now();
        let result = match self.prepare().await {
            Ok((path, loaded)) => self.registry.swap(path, loaded.model, loaded.metadata),
            Err(e) => Err(e),
        };
        let elapsed = started.elapsed();
        let metrics = serving_metrics();
        metrics.reload_duration_seconds.observe(elapsed.as_secs_f64());
        match result {
            Ok(state) => {
                metrics.reload_total.with_label_values(&["ok"]).inc();
                record_active(&state);
                info!(generation = state.generation, path = %state.path.display(), sha256_short = ?state.metadata.sha256_short(),
                    elapsed_ms = elapsed.as_millis() as u64, "model reloaded");
                Ok(ModelReport::as_loaded("reloaded", &state))
            }
            Err(e) => {
                metrics.reload_total.with_label_values(&[e.kind()]).inc();
                warn!(error = %e, kind = e.kind(), elapsed_ms = elapsed.as_millis() as u64, active_generation = self.registry.generation(),
                    "reload failed; previous model stays active");
                Err(e)
            }
        }
    }
}

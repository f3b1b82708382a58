//! Resolves which artifact file to load, fetching it from remote storage first
//! when a remote source is configured. Settings are re-read on every call so a
//! reload can follow a changed location.

use crate::error::ServingError;
use crate::fetch::{ArtifactFetcher, RemoteUri};
use recsys_core::{retry_async_if, RetryConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_MODEL_PATH: &str = "models/model.pkl";
/// File name the training pipeline writes inside each `v<timestamp>` directory.
pub const VERSIONED_ARTIFACT_NAME: &str = "model.pkl";
pub const DEFAULT_REGION: &str = "us-east-1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSettings {
    pub model_path: Option<PathBuf>,
    pub model_dir: Option<PathBuf>,
    pub remote_uri: Option<String>,
    pub local_override: Option<PathBuf>,
    pub region: String,
    pub fetch_timeout: Duration,
    pub fetch_retries: usize,
}

impl Default for ArtifactSettings {
    fn default() -> Self {
        Self { model_path: None, model_dir: None, remote_uri: None, local_override: None, region: DEFAULT_REGION.into(), fetch_timeout: Duration::from_secs(60), fetch_retries: 2 }
    }
}

fn env_nonempty(key: &str) -> Option<String> { std::env::var(key).ok().filter(|v| !v.trim().is_empty()) }

impl ArtifactSettings {
    /// Reads `MODEL_PATH`, `MODEL_DIR`, `MODEL_S3_URI`, `MODEL_LOCAL_PATH`, `AWS_REGION`,
    /// `MODEL_FETCH_TIMEOUT_SECS` and `MODEL_FETCH_RETRIES`. Empty values count as unset.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            model_path: env_nonempty("MODEL_PATH").map(PathBuf::from),
            model_dir: env_nonempty("MODEL_DIR").map(PathBuf::from),
            remote_uri: env_nonempty("MODEL_S3_URI"),
            local_override: env_nonempty("MODEL_LOCAL_PATH").map(PathBuf::from),
            region: env_nonempty("AWS_REGION").unwrap_or(defaults.region),
            fetch_timeout: env_nonempty("MODEL_FETCH_TIMEOUT_SECS").and_then(|v| v.parse().ok()).map(Duration::from_secs).unwrap_or(defaults.fetch_timeout),
            fetch_retries: env_nonempty("MODEL_FETCH_RETRIES").and_then(|v| v.parse().ok()).unwrap_or(defaults.fetch_retries),
        }
    }

    fn retry_config(&self) -> RetryConfig {
        RetryConfig { max_retries: self.fetch_retries, base_delay: Duration::from_millis(200), max_delay: Duration::from_secs(5), jitter: 0.25 }
    }
}

#[derive(Debug, Clone)]
pub enum ArtifactSettingsSource {
    Environment,
    Fixed(ArtifactSettings),
}

pub struct ArtifactLocator {
    source: ArtifactSettingsSource,
    fetcher: Option<Arc<dyn ArtifactFetcher>>,
}

impl ArtifactLocator {
    pub fn new(source: ArtifactSettingsSource) -> Self { Self { source, fetcher: None } }
    pub fn from_environment() -> Self { Self::new(ArtifactSettingsSource::Environment) }
    pub fn fixed(settings: ArtifactSettings) -> Self { Self::new(ArtifactSettingsSource::Fixed(settings)) }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn ArtifactFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Installs the S3 fetcher when the crate is built with the `s3` feature.
    pub fn with_default_fetcher(self) -> Self {
        #[cfg(feature = "s3")]
        { self.with_fetcher(Arc::new(crate::fetch::S3Fetcher)) }
        #[cfg(not(feature = "s3"))]
        { self }
    }

    pub fn settings(&self) -> ArtifactSettings {
        match &self.source {
            ArtifactSettingsSource::Environment => ArtifactSettings::from_env(),
            ArtifactSettingsSource::Fixed(s) => s.clone(),
        }
    }

    pub async fn resolve_path(&self) -> Result<PathBuf, ServingError> {
        let settings = self.settings();
        let Some(uri) = settings.remote_uri.as_deref() else { return resolve_local(&settings) };
        let remote = RemoteUri::parse(uri)?;
        let target = match &settings.local_override {
            Some(p) => p.clone(),
            None => resolve_local(&settings)?,
        };
        let fetcher = self.fetcher.as_ref().map(Arc::clone)
            .ok_or_else(|| ServingError::transport(uri, "remote fetch support is not available in this build"))?;
        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| ServingError::transport(uri, format!("cannot create {}: {e}", parent.display())))?;
        }

        let deadline = settings.fetch_timeout;
        retry_async_if(&settings.retry_config(), |attempt| {
            let fetcher = Arc::clone(&fetcher);
            let remote = remote.clone();
            let target = target.clone();
            let region = settings.region.clone();
            async move {
                debug!(attempt, uri = %remote, "fetching artifact");
                match tokio::time::timeout(deadline, fetcher.fetch(&remote, &target, &region)).await {
                    Ok(res) => res,
                    Err(_) => Err(ServingError::transport(&remote, format!("timed out after {}s", deadline.as_secs()))),
                }
            }
        }, ServingError::is_retryable).await?;
        info!(uri, target = %target.display(), "remote artifact fetched");
        Ok(target)
    }
}

/// Explicit path, else newest versioned directory, else the default path.
pub fn resolve_local(settings: &ArtifactSettings) -> Result<PathBuf, ServingError> {
    if let Some(p) = &settings.model_path { return Ok(p.clone()); }
    if let Some(dir) = &settings.model_dir { return latest_versioned(dir); }
    Ok(PathBuf::from(DEFAULT_MODEL_PATH))
}

/// Lexicographically greatest subdirectory of `dir` holding a `model.pkl`.
/// `v<YYYYMMDD_HHMMSS>` names sort chronologically.
pub fn latest_versioned(dir: &Path) -> Result<PathBuf, ServingError> {
    let entries = std::fs::read_dir(dir).map_err(|e| ServingError::missing(dir, format!("cannot list model directory: {e}")))?;
    let mut candidates: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path().join(VERSIONED_ARTIFACT_NAME))
        .filter(|artifact| artifact.is_file())
        .collect();
    candidates.sort();
    candidates.pop().ok_or_else(|| ServingError::missing(dir, "no versioned artifact found"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubFetcher { payload: Vec<u8>, failures_before_success: usize, calls: AtomicUsize }

    impl StubFetcher {
        fn new(payload: &[u8], failures_before_success: usize) -> Arc<Self> {
            Arc::new(Self { payload: payload.to_vec(), failures_before_success, calls: AtomicUsize::new(0) })
        }
    }

    #[async_trait]
    impl ArtifactFetcher for StubFetcher {
        async fn fetch(&self, source: &RemoteUri, target: &Path, _region: &str) -> Result<(), ServingError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures_before_success { return Err(ServingError::transport(source, "connection reset")); }
            std::fs::write(target, &self.payload).map_err(|e| ServingError::transport(source, e))
        }
    }

    struct HangingFetcher;

    #[async_trait]
    impl ArtifactFetcher for HangingFetcher {
        async fn fetch(&self, _source: &RemoteUri, _target: &Path, _region: &str) -> Result<(), ServingError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    fn settings() -> ArtifactSettings {
        ArtifactSettings { fetch_retries: 0, fetch_timeout: Duration::from_secs(5), ..Default::default() }
    }

    #[tokio::test]
    async fn default_path_when_nothing_configured() {
        let path = ArtifactLocator::fixed(settings()).resolve_path().await.unwrap();
        assert_eq!(path, PathBuf::from(DEFAULT_MODEL_PATH));
    }

    #[tokio::test]
    async fn explicit_path_wins() {
        let s = ArtifactSettings { model_path: Some("/srv/m.pkl".into()), model_dir: Some("/srv/models".into()), ..settings() };
        assert_eq!(ArtifactLocator::fixed(s).resolve_path().await.unwrap(), PathBuf::from("/srv/m.pkl"));
    }

    #[test]
    fn picks_latest_versioned_artifact() {
        let dir = tempfile::tempdir().unwrap();
        for v in ["v20240101_000000", "v20240301_120000", "v20240201_000000"] {
            std::fs::create_dir(dir.path().join(v)).unwrap();
            std::fs::write(dir.path().join(v).join(VERSIONED_ARTIFACT_NAME), b"x").unwrap();
        }
        // newest name but no artifact inside
        std::fs::create_dir(dir.path().join("v20991231_000000")).unwrap();
        let s = ArtifactSettings { model_dir: Some(dir.path().to_path_buf()), ..settings() };
        assert_eq!(resolve_local(&s).unwrap(), dir.path().join("v20240301_120000").join(VERSIONED_ARTIFACT_NAME));
    }

    #[test]
    fn empty_versioned_dir_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let s = ArtifactSettings { model_dir: Some(dir.path().to_path_buf()), ..settings() };
        assert_eq!(resolve_local(&s).unwrap_err().kind(), "artifact_missing");
        let s = ArtifactSettings { model_dir: Some(dir.path().join("absent")), ..settings() };
        assert_eq!(resolve_local(&s).unwrap_err().kind(), "artifact_missing");
    }

    #[tokio::test]
    async fn malformed_remote_uri_is_invalid_location() {
        let fetcher = StubFetcher::new(b"x", 0);
        let s = ArtifactSettings { remote_uri: Some("s3://bucket-only".into()), ..settings() };
        let err = ArtifactLocator::fixed(s).with_fetcher(fetcher.clone()).resolve_path().await.unwrap_err();
        assert_eq!(err.kind(), "invalid_location");
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn remote_fetch_lands_in_local_override() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested/dl/model.pkl");
        let s = ArtifactSettings {
            model_path: Some(dir.path().join("ignored.pkl")),
            remote_uri: Some("s3://bucket/models/model.pkl".into()),
            local_override: Some(target.clone()),
            ..settings()
        };
        let path = ArtifactLocator::fixed(s).with_fetcher(StubFetcher::new(b"payload", 0)).resolve_path().await.unwrap();
        assert_eq!(path, target);
        assert_eq!(std::fs::read(&target).unwrap(), b"payload");
    }

    #[tokio::test]
    async fn remote_fetch_defaults_to_resolved_path() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = dir.path().join("model.pkl");
        let s = ArtifactSettings { model_path: Some(resolved.clone()), remote_uri: Some("s3://bucket/k".into()), ..settings() };
        let path = ArtifactLocator::fixed(s).with_fetcher(StubFetcher::new(b"abc", 0)).resolve_path().await.unwrap();
        assert_eq!(path, resolved);
    }

    #[tokio::test]
    async fn transient_fetch_failures_are_retried() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = StubFetcher::new(b"abc", 2);
        let s = ArtifactSettings { model_path: Some(dir.path().join("m.pkl")), remote_uri: Some("s3://b/k".into()), fetch_retries: 2, ..settings() };
        ArtifactLocator::fixed(s).with_fetcher(fetcher.clone()).resolve_path().await.unwrap();
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_transport_error() {
        let dir = tempfile::tempdir().unwrap();
        let s = ArtifactSettings { model_path: Some(dir.path().join("m.pkl")), remote_uri: Some("s3://b/k".into()), fetch_retries: 1, ..settings() };
        let err = ArtifactLocator::fixed(s).with_fetcher(StubFetcher::new(b"abc", 5)).resolve_path().await.unwrap_err();
        assert_eq!(err.kind(), "transport");
    }

    #[tokio::test]
    async fn missing_fetcher_is_transport_error() {
        let s = ArtifactSettings { remote_uri: Some("s3://b/k".into()), local_override: Some("/tmp/x.pkl".into()), ..settings() };
        assert_eq!(ArtifactLocator::fixed(s).resolve_path().await.unwrap_err().kind(), "transport");
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_deadline_applies() {
        let dir = tempfile::tempdir().unwrap();
        let s = ArtifactSettings {
            model_path: Some(dir.path().join("m.pkl")),
            remote_uri: Some("s3://b/k".into()),
            fetch_timeout: Duration::from_secs(2),
            ..settings()
        };
        let err = ArtifactLocator::fixed(s).with_fetcher(Arc::new(HangingFetcher)).resolve_path().await.unwrap_err();
        assert_eq!(err.kind(), "transport");
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    #[serial_test::serial]
    fn settings_follow_environment() {
        std::env::set_var("MODEL_PATH", "/opt/model.pkl");
        std::env::set_var("MODEL_S3_URI", "");
        std::env::set_var("AWS_REGION", "eu-west-1");
        std::env::set_var("MODEL_FETCH_RETRIES", "4");
        let s = ArtifactLocator::from_environment().settings();
        for k in ["MODEL_PATH", "MODEL_S3_URI", "AWS_REGION", "MODEL_FETCH_RETRIES"] { std::env::remove_var(k); }
        assert_eq!(s.model_path, Some(PathBuf::from("/opt/model.pkl")));
        assert_eq!(s.remote_uri, None);
        assert_eq!(s.region, "eu-west-1");
        assert_eq!(s.fetch_retries, 4);
    }
}

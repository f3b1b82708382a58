use std::path::PathBuf;
use thiserror::Error;

/// Failures surfaced by locating, loading and serving a model artifact.
#[derive(Debug, Error)]
pub enum ServingError {
    #[error("invalid artifact location {uri}: {reason}")]
    InvalidLocation { uri: String, reason: String },
    #[error("artifact missing at {}: {reason}", path.display())]
    ArtifactMissing { path: PathBuf, reason: String },
    #[error("artifact at {} is malformed: {reason}", path.display())]
    ArtifactMalformed { path: PathBuf, reason: String },
    #[error("could not fetch {uri}: {reason}")]
    Transport { uri: String, reason: String },
    #[error("no model loaded")]
    NoModelLoaded,
    #[error("model registry already initialized")]
    AlreadyInitialized,
}

impl ServingError {
    pub(crate) fn missing(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::ArtifactMissing { path: path.into(), reason: reason.into() }
    }

    pub(crate) fn malformed(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::ArtifactMalformed { path: path.into(), reason: reason.to_string() }
    }

    pub(crate) fn invalid_location(uri: &str, reason: impl Into<String>) -> Self {
        Self::InvalidLocation { uri: uri.to_string(), reason: reason.into() }
    }

    pub fn transport(uri: impl ToString, reason: impl ToString) -> Self {
        Self::Transport { uri: uri.to_string(), reason: reason.to_string() }
    }

    /// Stable identifier used in HTTP error bodies and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidLocation { .. } => "invalid_location",
            Self::ArtifactMissing { .. } => "artifact_missing",
            Self::ArtifactMalformed { .. } => "artifact_malformed",
            Self::Transport { .. } => "transport",
            Self::NoModelLoaded => "no_model_loaded",
            Self::AlreadyInitialized => "already_initialized",
        }
    }

    /// Only remote fetch failures are worth another attempt.
    pub fn is_retryable(&self) -> bool { matches!(self, Self::Transport { .. }) }
}

/// Reading size, digest or mtime of an artifact failed. Never escapes the
/// `Option`-returning inspector API; it only reaches debug logs.
#[derive(Debug, Error)]
pub enum IntegrityReadError {
    #[error("cannot read {}: {source}", path.display())]
    Io { path: PathBuf, #[source] source: std::io::Error },
}

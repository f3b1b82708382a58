//! Recommendation model serving: locate an artifact, verify and load it, hot-swap
//! it behind a lock-free snapshot, and answer top-N requests over HTTP.

pub mod error;
pub mod fetch;
pub mod http;
pub mod integrity;
pub mod loader;
pub mod locator;
pub mod metrics;
pub mod model;
pub mod recommend;
pub mod registry;
pub mod service;
pub mod settings;
pub mod watcher;

pub use error::ServingError;
pub use locator::{ArtifactLocator, ArtifactSettings, ArtifactSettingsSource};
pub use model::{Model, ModelMetadata};
pub use recommend::{recommend, Reason, Recommendation};
pub use registry::{ModelRegistry, ServingState};
pub use service::{ModelReport, ModelService, Prediction};

//! In-memory model and the metadata describing the artifact it came from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

pub type UserId = i64;
pub type ProductId = i64;

pub const UNKNOWN_MODEL_TYPE: &str = "unknown";

/// Popularity model produced by the training pipeline. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Model {
    pub model_type: String,
    pub user_top_products: HashMap<UserId, Vec<ProductId>>,
    pub global_top_products: Vec<ProductId>,
}

/// Wire shape of an artifact, shared by every supported serialization.
#[derive(Debug, Deserialize)]
pub(crate) struct ModelDocument {
    #[serde(rename = "type", default)]
    model_type: Option<String>,
    #[serde(default)]
    user_top_products: HashMap<UserId, Vec<ProductId>>,
    #[serde(default)]
    global_top_products: Vec<ProductId>,
}

impl From<ModelDocument> for Model {
    fn from(doc: ModelDocument) -> Self {
        Self {
            model_type: doc.model_type.unwrap_or_else(|| UNKNOWN_MODEL_TYPE.to_string()),
            user_top_products: doc.user_top_products,
            global_top_products: doc.global_top_products,
        }
    }
}

/// Identity of the artifact bytes a model was decoded from. Computed once per load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelMetadata {
    pub path: PathBuf,
    pub size_bytes: Option<u64>,
    pub sha256: Option<String>,
    pub mtime_utc: Option<DateTime<Utc>>,
    pub loaded_at: DateTime<Utc>,
}

impl ModelMetadata {
    pub fn sha256_short(&self) -> Option<&str> { self.sha256.as_deref().map(crate::integrity::short_digest) }
}

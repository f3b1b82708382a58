//! Reads and validates model artifacts. Either a fully validated [`Model`] is
//! returned or an error; nothing partially decoded ever leaves this module.

use crate::error::ServingError;
use crate::integrity;
use crate::model::{Model, ModelDocument, ModelMetadata};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactFormat { Pickle, Json, Yaml }

impl ArtifactFormat {
    /// Unknown extensions fall back to pickle, the training pipeline's native output.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase()).as_deref() {
            Some("json") => Self::Json,
            Some("yaml") | Some("yml") => Self::Yaml,
            _ => Self::Pickle,
        }
    }
}

/// A decoded model together with the metadata of the exact bytes it came from.
#[derive(Debug, Clone)]
pub struct LoadedArtifact {
    pub model: Model,
    pub metadata: ModelMetadata,
}

pub fn load(path: &Path) -> Result<Model, ServingError> { load_artifact(path).map(|a| a.model) }

pub fn load_artifact(path: &Path) -> Result<LoadedArtifact, ServingError> {
    let meta = match fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == ErrorKind::NotFound => return Err(ServingError::missing(path, "file does not exist")),
        Err(e) => return Err(ServingError::missing(path, format!("unreadable: {e}"))),
    };
    if !meta.is_file() { return Err(ServingError::missing(path, "not a regular file")); }
    if meta.len() == 0 { return Err(ServingError::missing(path, "file is empty")); }
    let bytes = fs::read(path).map_err(|e| ServingError::missing(path, format!("unreadable: {e}")))?;
    // the file may have been truncated between stat and read
    if bytes.is_empty() { return Err(ServingError::missing(path, "file is empty")); }

    let format = ArtifactFormat::from_path(path);
    let model = decode(path, format, &bytes)?;
    debug!(path = %path.display(), ?format, users = model.user_top_products.len(), "artifact decoded");
    let mtime = meta.modified().ok().map(chrono::DateTime::<chrono::Utc>::from);
    let metadata = integrity::metadata_for_loaded(path, &bytes, mtime);
    Ok(LoadedArtifact { model, metadata })
}

pub fn decode(path: &Path, format: ArtifactFormat, bytes: &[u8]) -> Result<Model, ServingError> {
    let doc: ModelDocument = match format {
        ArtifactFormat::Json => {
            let value: serde_json::Value = serde_json::from_slice(bytes).map_err(|e| ServingError::malformed(path, e))?;
            if !value.is_object() { return Err(not_a_mapping(path, json_kind(&value))); }
            serde_json::from_value(value).map_err(|e| ServingError::malformed(path, e))?
        }
        ArtifactFormat::Yaml => {
            let value: serde_yaml::Value = serde_yaml::from_slice(bytes).map_err(|e| ServingError::malformed(path, e))?;
            if !value.is_mapping() { return Err(not_a_mapping(path, "non-mapping yaml value")); }
            serde_yaml::from_value(value).map_err(|e| ServingError::malformed(path, e))?
        }
        ArtifactFormat::Pickle => {
            let value = serde_pickle::value_from_slice(bytes, serde_pickle::DeOptions::new())
                .map_err(|e| ServingError::malformed(path, e))?;
            if !matches!(value, serde_pickle::Value::Dict(_)) { return Err(not_a_mapping(path, "non-dict pickle object")); }
            serde_pickle::from_value(value).map_err(|e| ServingError::malformed(path, e))?
        }
    };
    Ok(doc.into())
}

fn not_a_mapping(path: &Path, found: &str) -> ServingError {
    ServingError::malformed(path, format!("top-level value is not a mapping (found {found})"))
}

fn json_kind(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

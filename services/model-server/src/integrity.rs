//! Size, mtime and SHA-256 fingerprints of artifact files.
//!
//! The `Option` returning functions are the reporting contract: any read
//! failure yields `None` (logged at debug) and never fails a request. The
//! `try_*` variants expose the underlying [`IntegrityReadError`].

use crate::error::IntegrityReadError;
use crate::model::ModelMetadata;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Read block size for streamed hashing; memory use stays flat regardless of artifact size.
pub const HASH_CHUNK_BYTES: usize = 1 << 20;
pub const SHORT_DIGEST_LEN: usize = 8;

/// Point-in-time view of a file on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Fingerprint {
    pub size_bytes: Option<u64>,
    pub sha256: Option<String>,
    pub mtime_utc: Option<DateTime<Utc>>,
}

pub fn short_digest(hex: &str) -> &str { &hex[..hex.len().min(SHORT_DIGEST_LEN)] }

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> IntegrityReadError + '_ {
    move |source| IntegrityReadError::Io { path: path.to_path_buf(), source }
}

fn absent<T>(what: &'static str, res: Result<T, IntegrityReadError>) -> Option<T> {
    match res {
        Ok(v) => Some(v),
        Err(e) => { debug!(what, error = %e, "integrity read degraded to absent"); None }
    }
}

pub fn try_size_of(path: &Path) -> Result<u64, IntegrityReadError> {
    fs::metadata(path).map(|m| m.len()).map_err(io_err(path))
}

pub fn try_mtime_of(path: &Path) -> Result<DateTime<Utc>, IntegrityReadError> {
    let modified = fs::metadata(path).and_then(|m| m.modified()).map_err(io_err(path))?;
    Ok(DateTime::<Utc>::from(modified))
}

pub fn try_hash_of(path: &Path) -> Result<String, IntegrityReadError> {
    let mut file = File::open(path).map_err(io_err(path))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_CHUNK_BYTES];
    loop {
        let n = file.read(&mut buf).map_err(io_err(path))?;
        if n == 0 { break; }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

pub fn size_of(path: &Path) -> Option<u64> { absent("size", try_size_of(path)) }
pub fn mtime_of(path: &Path) -> Option<DateTime<Utc>> { absent("mtime", try_mtime_of(path)) }
pub fn hash_of(path: &Path) -> Option<String> { absent("sha256", try_hash_of(path)) }

/// Fresh, uncached fingerprint; used by health to spot on-disk drift.
pub fn fingerprint(path: &Path) -> Fingerprint {
    Fingerprint { size_bytes: size_of(path), sha256: hash_of(path), mtime_utc: mtime_of(path) }
}

pub fn digest_bytes(bytes: &[u8]) -> String { hex::encode(Sha256::digest(bytes)) }

/// Metadata for an artifact whose bytes were already read for decoding, so the
/// digest describes exactly what was deserialized.
pub fn metadata_for_loaded(path: &Path, bytes: &[u8], mtime_utc: Option<DateTime<Utc>>) -> ModelMetadata {
    ModelMetadata {
        path: path.to_path_buf(),
        size_bytes: Some(bytes.len() as u64),
        sha256: Some(digest_bytes(bytes)),
        mtime_utc,
        loaded_at: Utc::now(),
    }
}

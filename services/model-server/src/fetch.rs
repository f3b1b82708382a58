//! Remote artifact retrieval. The locator only sees the [`ArtifactFetcher`]
//! capability, so tests inject stubs and builds without `s3` simply have none.

use crate::error::ServingError;
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use url::Url;

/// `s3://bucket/key` split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteUri {
    pub bucket: String,
    pub key: String,
}

impl RemoteUri {
    pub fn parse(uri: &str) -> Result<Self, ServingError> {
        let url = Url::parse(uri).map_err(|e| ServingError::invalid_location(uri, format!("not a uri: {e}")))?;
        if url.scheme() != "s3" {
            return Err(ServingError::invalid_location(uri, format!("unsupported scheme {:?}", url.scheme())));
        }
        let bucket = url.host_str().filter(|h| !h.is_empty())
            .ok_or_else(|| ServingError::invalid_location(uri, "missing bucket"))?;
        let key = urlencoding::decode(url.path().trim_start_matches('/'))
            .map_err(|e| ServingError::invalid_location(uri, format!("bad key encoding: {e}")))?;
        if key.is_empty() { return Err(ServingError::invalid_location(uri, "missing key")); }
        Ok(Self { bucket: bucket.to_string(), key: key.into_owned() })
    }
}

impl fmt::Display for RemoteUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "s3://{}/{}", self.bucket, self.key) }
}

/// Fetch the bytes behind a remote URI into a local file.
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    async fn fetch(&self, source: &RemoteUri, target: &Path, region: &str) -> Result<(), ServingError>;
}

/// Sibling path a download is staged in before being renamed over `target`.
pub fn staging_path(target: &Path) -> PathBuf {
    let name = target.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| "artifact".into());
    target.with_file_name(format!(".{name}.download"))
}

#[cfg(feature = "s3")]
pub use s3::S3Fetcher;

#[cfg(feature = "s3")]
mod s3 {
    use super::{staging_path, ArtifactFetcher, RemoteUri};
    use crate::error::ServingError;
    use async_trait::async_trait;
    use aws_sdk_s3::config::Region;
    use aws_sdk_s3::error::DisplayErrorContext;
    use std::path::Path;
    use tokio::io::AsyncWriteExt;
    use tracing::info;

    #[derive(Debug, Default, Clone)]
    pub struct S3Fetcher;

    #[async_trait]
    impl ArtifactFetcher for S3Fetcher {
        async fn fetch(&self, source: &RemoteUri, target: &Path, region: &str) -> Result<(), ServingError> {
            let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
                .region(Region::new(region.to_string()))
                .load()
                .await;
            let client = aws_sdk_s3::Client::new(&config);
            let response = client.get_object().bucket(&source.bucket).key(&source.key).send().await
                .map_err(|err| ServingError::transport(source, format!("get_object failed: {}", DisplayErrorContext(&err))))?;

            let staging = staging_path(target);
            let io = |what: &str, e: std::io::Error| ServingError::transport(source, format!("{what} {}: {e}", staging.display()));
            let mut file = tokio::fs::File::create(&staging).await.map_err(|e| io("create", e))?;
            let mut body = Box::pin(response.body.into_async_read());
            let written = tokio::io::copy(&mut body, &mut file).await.map_err(|e| io("write", e))?;
            file.flush().await.map_err(|e| io("flush", e))?;
            file.sync_all().await.map_err(|e| io("sync", e))?;
            drop(file);
            tokio::fs::rename(&staging, target).await.map_err(|e| io("rename", e))?;
            info!(uri = %source, target = %target.display(), bytes = written, "artifact downloaded");
            Ok(())
        }
    }
}

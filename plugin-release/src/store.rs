#![doc = "Release store integration: bridges the core ArtifactStore seam to object_store backends (S3 or a local directory)."]
//
//! # Release store (CLI <-> Core)
//!
//! The core release stage only knows [`ArtifactStore`]. This module provides
//! [`BucketClient`], the implementation the CLI hands to the pipeline.
//!
//! - `s3`: `AmazonS3Builder::from_env()`, so credentials and region come from the
//!   usual `AWS_*` variables (or `.env`).
//! - `local`: a directory on disk laid out like the bucket, handy for dry runs.
//!
//! The backend is connected on the first upload, so commands that never
//! release never need credentials.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use plugin_release_core::contract::{ArtifactStore, UploadError, UploadReceipt};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

/// Where released archives go.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreConfig {
    #[default]
    S3,
    Local {
        path: PathBuf,
    },
}

pub struct BucketClient {
    config: StoreConfig,
    bucket: String,
    inner: OnceCell<Arc<dyn ObjectStore>>,
}

impl BucketClient {
    pub fn new(config: StoreConfig, bucket: impl Into<String>) -> Self {
        Self {
            config,
            bucket: bucket.into(),
            inner: OnceCell::new(),
        }
    }

    fn connect(&self) -> Result<Arc<dyn ObjectStore>, UploadError> {
        match &self.config {
            StoreConfig::S3 => {
                let store = AmazonS3Builder::from_env()
                    .with_bucket_name(&self.bucket)
                    .build()
                    .map_err(|e| {
                        tracing::error!(error = ?e, bucket = %self.bucket, "Failed to build S3 client from environment");
                        e
                    })?;
                tracing::info!(bucket = %self.bucket, "Initialised S3 release store from environment");
                Ok(Arc::new(store))
            }
            StoreConfig::Local { path } => {
                std::fs::create_dir_all(path)?;
                let store = LocalFileSystem::new_with_prefix(path)?;
                tracing::info!(path = %path.display(), "Initialised local release store");
                Ok(Arc::new(store))
            }
        }
    }

    fn location(&self, key: &str) -> String {
        match &self.config {
            StoreConfig::S3 => format!("https://s3.amazonaws.com/{}/{key}", self.bucket),
            StoreConfig::Local { path } => path.join(key).display().to_string(),
        }
    }
}

#[async_trait]
impl ArtifactStore for BucketClient {
    fn bucket(&self) -> String {
        match &self.config {
            StoreConfig::S3 => self.bucket.clone(),
            StoreConfig::Local { path } => path.display().to_string(),
        }
    }

    async fn put_object(&self, key: &str, body: Bytes) -> Result<UploadReceipt, UploadError> {
        let store = self
            .inner
            .get_or_try_init(|| async { self.connect() })
            .await?;
        tracing::info!(key, bytes = body.len(), "Uploading object");
        let result = store
            .put(&ObjectPath::from(key), body)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, key, "Object upload failed");
                e
            })?;
        Ok(UploadReceipt {
            key: key.to_string(),
            location: self.location(key),
            e_tag: result.e_tag,
        })
    }
}

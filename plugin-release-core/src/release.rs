//! Release stage: publish the packaged archive under every release key.
//!
//! The archive is read once and handed to one upload task per key. Completion
//! is a join over the invocation-local [`JoinSet`]; the stage succeeds only
//! after every upload reported success. On the first failure (or when the
//! optional time limit expires) the remaining uploads are aborted and the error
//! lists the keys that were already published.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::config::ReleaseConfig;
use crate::contract::{ArtifactStore, UploadError, UploadReceipt};
use crate::error::ReleaseError;
use crate::manifest::Manifest;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseReport {
    pub archive_path: PathBuf,
    pub bucket: String,
    pub receipts: Vec<UploadReceipt>,
}

/// The version-stable alias key followed by the version-pinned key.
pub fn release_keys(config: &ReleaseConfig, manifest: &Manifest) -> Vec<String> {
    let prefix = format!("{}/{}", config.scope, config.family);
    vec![
        format!("{prefix}/{}-latest.tar.gz", config.family),
        format!("{prefix}/{}", manifest.archive_file_name()),
    ]
}

enum Drain {
    Done(Vec<UploadReceipt>),
    Failed { key: String, source: UploadError },
    Panicked(String),
}

/// Upload `archive_path` to each of `keys`, concurrently.
pub async fn release(
    store: Arc<dyn ArtifactStore>,
    archive_path: &Path,
    keys: &[String],
    timeout: Option<Duration>,
) -> Result<ReleaseReport, ReleaseError> {
    let body = tokio::fs::read(archive_path).await.map_err(|source| {
        error!(error = ?source, path = %archive_path.display(), "[RELEASE][ERROR] Failed to read archive");
        ReleaseError::Read {
            path: archive_path.to_path_buf(),
            source,
        }
    })?;
    let body = Bytes::from(body);
    let bucket = store.bucket();
    info!(
        archive = %archive_path.display(),
        bucket = %bucket,
        keys = ?keys,
        bytes = body.len(),
        "[RELEASE] Starting uploads"
    );

    let mut uploads = JoinSet::new();
    for key in keys {
        let store = Arc::clone(&store);
        let key = key.clone();
        let body = body.clone();
        uploads.spawn(async move {
            let result = store.put_object(&key, body).await;
            (key, result)
        });
    }

    let mut published: Vec<String> = Vec::new();
    let waited = match timeout {
        Some(limit) => tokio::time::timeout(limit, drain(&mut uploads, &mut published))
            .await
            .map_err(|_| limit),
        None => Ok(drain(&mut uploads, &mut published).await),
    };
    let drained = match waited {
        Ok(drained) => drained,
        Err(limit) => {
            uploads.abort_all();
            let pending: Vec<String> = keys
                .iter()
                .filter(|key| !published.contains(*key))
                .cloned()
                .collect();
            error!(limit = ?limit, pending = ?pending, "[RELEASE][ERROR] Uploads timed out");
            return Err(ReleaseError::TimedOut {
                limit,
                pending,
                published,
            });
        }
    };

    match drained {
        Drain::Done(receipts) => Ok(ReleaseReport {
            archive_path: archive_path.to_path_buf(),
            bucket,
            receipts,
        }),
        Drain::Failed { key, source } => {
            uploads.abort_all();
            error!(key = %key, error = %source, published = ?published, "[RELEASE][ERROR] Upload failed, aborting remaining uploads");
            Err(ReleaseError::Upload {
                key,
                published,
                source,
            })
        }
        Drain::Panicked(message) => {
            uploads.abort_all();
            Err(ReleaseError::Task { message, published })
        }
    }
}

async fn drain(
    uploads: &mut JoinSet<(String, Result<UploadReceipt, UploadError>)>,
    published: &mut Vec<String>,
) -> Drain {
    let mut receipts = Vec::new();
    while let Some(joined) = uploads.join_next().await {
        match joined {
            Ok((key, Ok(receipt))) => {
                info!(key = %key, location = %receipt.location, "[RELEASE] Finished upload. Available at {}", receipt.location);
                published.push(key);
                receipts.push(receipt);
            }
            Ok((key, Err(source))) => return Drain::Failed { key, source },
            Err(e) => return Drain::Panicked(e.to_string()),
        }
    }
    Drain::Done(receipts)
}

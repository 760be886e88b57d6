//! # contract: seams between the pipeline and the outside world
//!
//! The pipeline talks to two external systems: the remote object store that
//! receives released archives, and the linter that gates the build. Both are
//! traits here so the CLI can plug in real clients and tests can plug in
//! `mockall` mocks (exported under the `test-export-mocks` feature).

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use mockall::automock;

use crate::error::LintError;

/// Boxed error returned by store implementations.
pub type UploadError = Box<dyn std::error::Error + Send + Sync>;

/// What a store hands back after a successful full-object put.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    /// Object key inside the bucket.
    pub key: String,
    /// Human-facing location where the object can now be fetched.
    pub location: String,
    pub e_tag: Option<String>,
}

/// Full-object overwrite upload into a single bucket.
///
/// Implementors own bucket selection and credentials; callers only name keys.
/// No conditional or versioned puts are made.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Bucket (or root) objects land in, used for logging.
    fn bucket(&self) -> String;

    /// Upload `body` to `key`, replacing any existing object.
    async fn put_object(&self, key: &str, body: Bytes) -> Result<UploadReceipt, UploadError>;
}

/// A single lint finding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub path: PathBuf,
    pub line: usize,
    pub column: usize,
    pub rule: String,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{}: {} [{}]",
            self.path.display(),
            self.line,
            self.column,
            self.message,
            self.rule
        )
    }
}

/// Static analysis over an already-resolved list of files.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait Linter: Send + Sync {
    fn name(&self) -> String;

    /// Check `files` (relative to `root`) and return every violation found.
    fn lint(&self, root: &Path, files: &[PathBuf]) -> Result<Vec<Diagnostic>, LintError>;
}

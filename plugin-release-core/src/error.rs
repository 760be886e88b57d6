//! Error types for every pipeline stage.
//!
//! Each stage owns a narrow error enum; [`PipelineError`] aggregates them so the
//! scheduler can short-circuit on the first failure and the CLI can report it.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::contract::UploadError;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse manifest {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("manifest {path} is not a JSON object")]
    NotAnObject { path: PathBuf },
    #[error("manifest {path} is missing the `{field}` field")]
    MissingField { path: PathBuf, field: &'static str },
    #[error("failed to serialize manifest for {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write manifest {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("include entry {entry} must be a relative path inside the project root")]
    InvalidInclude { entry: PathBuf },
    #[error("include entries {first} and {second} overlap")]
    OverlappingInclude { first: PathBuf, second: PathBuf },
    #[error("include entry {entry} does not exist at {path}")]
    MissingSource { entry: PathBuf, path: PathBuf },
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to walk {root}: {source}")]
    Walk {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },
    #[error("sync task for {entry} did not complete: {message}")]
    Task { entry: PathBuf, message: String },
}

#[derive(Debug, Error)]
pub enum LintError {
    #[error("invalid lint pattern `{pattern}`: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to launch linter `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("linter `{program}` failed with status {status}: {stderr}")]
    ToolFailed {
        program: String,
        status: String,
        stderr: String,
    },
}

#[derive(Debug, Error)]
pub enum CleanError {
    #[error("failed to remove {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum PackageError {
    #[error("build directory {path} does not exist")]
    MissingBuildDir { path: PathBuf },
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to walk {root}: {source}")]
    Walk {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },
    #[error("packaging task did not complete: {0}")]
    Task(String),
}

#[derive(Debug, Error)]
pub enum ReleaseError {
    #[error("failed to read archive {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("upload of {key} failed (already published: {published:?}): {source}")]
    Upload {
        key: String,
        published: Vec<String>,
        #[source]
        source: UploadError,
    },
    #[error("upload timed out after {limit:?} (pending: {pending:?}, published: {published:?})")]
    TimedOut {
        limit: Duration,
        pending: Vec<String>,
        published: Vec<String>,
    },
    #[error("upload task did not complete: {message} (already published: {published:?})")]
    Task {
        message: String,
        published: Vec<String>,
    },
}

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("file watcher failed: {0}")]
    Notify(#[from] notify::Error),
    #[error("initial dev run failed: {0}")]
    Startup(#[source] Box<PipelineError>),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Lint(#[from] LintError),
    #[error("lint reported {count} violation(s)")]
    LintViolations { count: usize },
    #[error(transparent)]
    Clean(#[from] CleanError),
    #[error(transparent)]
    Package(#[from] PackageError),
    #[error(transparent)]
    Release(#[from] ReleaseError),
    #[error("stage `{stage}` requires `{missing}`, which has not run")]
    MissingPrerequisite {
        stage: &'static str,
        missing: &'static str,
    },
    #[error("stage graph contains a cycle through `{0}`")]
    Cycle(&'static str),
}

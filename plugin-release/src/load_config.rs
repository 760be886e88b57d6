/// `load_config` module: loads an optional YAML file and adapts it into the core [`PipelineConfig`]
/// plus the CLI-only release store selection.
///
/// This module is the only place where user-supplied YAML is parsed. Every key is
/// optional; anything left out falls back to the layout of a plugin checked out
/// next to its host application.
///
/// # Path resolution
/// - `project_root` is relative to the directory holding the config file
///   (or the current directory when no file is used).
/// - `host_root`, `build_dir`, `target_dir` and a local store `path` are
///   relative to `project_root`.
/// - `include` and `watch.paths` stay project-relative; the core resolves them.
///
/// # Errors
/// Failures surface as `anyhow::Error` at the CLI boundary.
use anyhow::{Context, Result};
use plugin_release_core::config::{
    LintConfig, PipelineConfig, ReleaseConfig, WatchConfig, DEFAULT_RELEASE_TIMEOUT,
};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info};

use crate::store::StoreConfig;

/// Looked up in the current directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "plugin-release.yaml";

#[derive(Debug, Clone)]
pub struct CliConfig {
    pub pipeline: PipelineConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    project_root: Option<PathBuf>,
    host_root: Option<PathBuf>,
    build_dir: Option<PathBuf>,
    target_dir: Option<PathBuf>,
    include: Option<Vec<PathBuf>>,
    #[serde(default)]
    lint: RawLint,
    #[serde(default)]
    watch: RawWatch,
    #[serde(default)]
    release: RawRelease,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawLint {
    patterns: Option<Vec<String>>,
    max_line_length: Option<usize>,
    command: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawWatch {
    paths: Option<Vec<PathBuf>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRelease {
    bucket: Option<String>,
    scope: Option<String>,
    family: Option<String>,
    /// `0` disables the limit.
    timeout_secs: Option<u64>,
    store: Option<StoreConfig>,
}

/// Load `path` if given, else `plugin-release.yaml` from the current directory
/// if present, else built-in defaults rooted at the current directory.
pub fn resolve_config(path: Option<&Path>) -> Result<CliConfig> {
    if let Some(path) = path {
        return load_config(path);
    }
    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    let candidate = cwd.join(DEFAULT_CONFIG_FILE);
    if candidate.is_file() {
        return load_config(candidate);
    }
    info!(cwd = %cwd.display(), "No config file found, using defaults");
    Ok(from_raw(RawConfig::default(), &cwd))
}

/// Load and adapt a YAML config file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let content = fs::read_to_string(path_ref).map_err(|e| {
        error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
        anyhow::anyhow!("Failed to read config file {:?}: {}", path_ref, e)
    })?;

    let base_dir = match path_ref.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    parse_config(&content, base_dir)
}

/// Parse YAML `content`, resolving relative paths against `base_dir`.
///
/// A relative `base_dir` is taken from the current directory, so every
/// resolved path in the result is absolute.
pub fn parse_config(content: &str, base_dir: &Path) -> Result<CliConfig> {
    let base_dir = std::path::absolute(base_dir)
        .with_context(|| format!("Failed to resolve config directory {base_dir:?}"))?;
    // an empty file is a valid "all defaults" config
    let raw: RawConfig = if content.trim().is_empty() {
        RawConfig::default()
    } else {
        serde_yaml::from_str(content).map_err(|e| {
            error!(error = ?e, "Failed to parse config YAML");
            anyhow::anyhow!("Failed to parse config YAML: {e}")
        })?
    };
    info!("Parsed config YAML successfully");
    Ok(from_raw(raw, &base_dir))
}

fn from_raw(raw: RawConfig, base_dir: &Path) -> CliConfig {
    let project_root = match raw.project_root {
        Some(root) => base_dir.join(root),
        None => base_dir.to_path_buf(),
    };
    let mut pipeline = PipelineConfig::for_project(&project_root);

    if let Some(host_root) = raw.host_root {
        pipeline.host_root = project_root.join(host_root);
    }
    if let Some(build_dir) = raw.build_dir {
        pipeline.build_dir = project_root.join(build_dir);
    }
    if let Some(target_dir) = raw.target_dir {
        pipeline.target_dir = project_root.join(target_dir);
    }
    if let Some(include) = raw.include {
        pipeline.include = include;
    }

    let lint_defaults = LintConfig::default();
    pipeline.lint = LintConfig {
        patterns: raw.lint.patterns.unwrap_or(lint_defaults.patterns),
        max_line_length: raw
            .lint
            .max_line_length
            .unwrap_or(lint_defaults.max_line_length),
        command: raw.lint.command.unwrap_or_default(),
    };
    pipeline.watch = WatchConfig {
        paths: raw.watch.paths.unwrap_or(WatchConfig::default().paths),
    };

    let release_defaults = ReleaseConfig::default();
    pipeline.release = ReleaseConfig {
        bucket: raw.release.bucket.unwrap_or(release_defaults.bucket),
        scope: raw.release.scope.unwrap_or(release_defaults.scope),
        family: raw.release.family.unwrap_or(release_defaults.family),
        timeout: match raw.release.timeout_secs {
            None => Some(DEFAULT_RELEASE_TIMEOUT),
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
        },
    };

    let store = match raw.release.store.unwrap_or_default() {
        StoreConfig::Local { path } => StoreConfig::Local {
            path: project_root.join(path),
        },
        StoreConfig::S3 => StoreConfig::S3,
    };

    CliConfig { pipeline, store }
}

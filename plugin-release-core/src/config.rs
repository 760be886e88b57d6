use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Paths copied into every sync destination, relative to the project root.
pub const DEFAULT_INCLUDE: &[&str] = &["package.json", "index.js", "node_modules", "functions"];
/// Files checked by the lint stage.
pub const DEFAULT_LINT_PATTERNS: &[&str] = &["index.js", "functions/**/*.js"];
/// Paths whose changes retrigger the dev loop.
pub const DEFAULT_WATCH_PATHS: &[&str] = &["package.json", "index.js", "functions"];

pub const DEFAULT_BUCKET: &str = "download.elasticsearch.org";
pub const DEFAULT_SCOPE: &str = "elastic";
pub const DEFAULT_FAMILY: &str = "timelion-extras";
pub const DEFAULT_RELEASE_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_MAX_LINE_LENGTH: usize = 140;

/// Fully resolved pipeline configuration. All paths are absolute or relative to
/// the process working directory; nothing here is resolved lazily.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub project_root: PathBuf,
    /// Root of the host application; its `plugins/<name>` is the sync target.
    pub host_root: PathBuf,
    pub build_dir: PathBuf,
    pub target_dir: PathBuf,
    pub include: Vec<PathBuf>,
    pub lint: LintConfig,
    pub watch: WatchConfig,
    pub release: ReleaseConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LintConfig {
    pub patterns: Vec<String>,
    pub max_line_length: usize,
    /// External linter invocation; the builtin rules run when empty.
    pub command: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    pub paths: Vec<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseConfig {
    pub bucket: String,
    pub scope: String,
    /// Artifact family, used both as directory and as the `-latest` alias name.
    pub family: String,
    /// `None` waits for uploads indefinitely.
    pub timeout: Option<Duration>,
}

impl Default for LintConfig {
    fn default() -> Self {
        Self {
            patterns: DEFAULT_LINT_PATTERNS.iter().map(|p| p.to_string()).collect(),
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            command: Vec::new(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            paths: DEFAULT_WATCH_PATHS.iter().map(PathBuf::from).collect(),
        }
    }
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            bucket: DEFAULT_BUCKET.to_string(),
            scope: DEFAULT_SCOPE.to_string(),
            family: DEFAULT_FAMILY.to_string(),
            timeout: Some(DEFAULT_RELEASE_TIMEOUT),
        }
    }
}

impl PipelineConfig {
    /// Defaults for a plugin living at `project_root` next to a `kibana` checkout.
    pub fn for_project(project_root: impl Into<PathBuf>) -> Self {
        let project_root = project_root.into();
        Self {
            host_root: project_root.join("..").join("kibana"),
            build_dir: project_root.join("build"),
            target_dir: project_root.join("target"),
            include: DEFAULT_INCLUDE.iter().map(PathBuf::from).collect(),
            lint: LintConfig::default(),
            watch: WatchConfig::default(),
            release: ReleaseConfig::default(),
            project_root,
        }
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.project_root.join("package.json")
    }

    pub fn host_manifest_path(&self) -> PathBuf {
        self.host_root.join("package.json")
    }

    /// `<host_root>/plugins/<plugin_name>`
    pub fn host_plugin_dir(&self, plugin_name: &str) -> PathBuf {
        self.host_root.join("plugins").join(plugin_name)
    }

    /// `<build_dir>/<plugin_name>`
    pub fn build_target(&self, plugin_name: &str) -> PathBuf {
        self.build_dir.join(plugin_name)
    }

    /// Resolve a project-relative path (absolute paths pass through).
    pub fn project_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }

    pub fn trace_loaded(&self) {
        info!(
            project_root = %self.project_root.display(),
            host_root = %self.host_root.display(),
            include_count = self.include.len(),
            bucket = %self.release.bucket,
            "Loaded PipelineConfig"
        );
        debug!(?self, "PipelineConfig loaded (full debug)");
    }
}

//! Plugin manifest (`package.json`) handling.
//!
//! The manifest is read once per invocation. Only `name`, `version` and the key
//! set of `devDependencies` matter to the pipeline; everything else is carried
//! through untouched so a derived copy differs from the original in `version`
//! alone.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::{debug, error, info};

use crate::error::ManifestError;
use crate::sync::ExcludeSet;

/// Directory holding installed dependencies.
pub const DEPENDENCY_DIR: &str = "node_modules";

#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    pub name: String,
    pub version: String,
    /// Names of development-only dependencies, in manifest order.
    pub dev_dependencies: Vec<String>,
    raw: Map<String, Value>,
}

/// What `trick_manifest_version` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrickOutcome {
    Written {
        path: PathBuf,
        from: String,
        to: String,
    },
    AlreadyMatching {
        version: String,
    },
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path).map_err(|source| {
            error!(error = ?source, path = %path.display(), "Failed to read manifest");
            ManifestError::Read {
                path: path.to_path_buf(),
                source,
            }
        })?;
        let manifest = Self::parse(&content, path)?;
        info!(
            path = %path.display(),
            name = %manifest.name,
            version = %manifest.version,
            dev_dependencies = manifest.dev_dependencies.len(),
            "Loaded manifest"
        );
        Ok(manifest)
    }

    /// Parse manifest text; `origin` is only used in error messages.
    pub fn parse(content: &str, origin: &Path) -> Result<Self, ManifestError> {
        let value: Value = serde_json::from_str(content).map_err(|source| ManifestError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        let Value::Object(raw) = value else {
            return Err(ManifestError::NotAnObject {
                path: origin.to_path_buf(),
            });
        };

        let field = |field: &'static str| -> Result<String, ManifestError> {
            raw.get(field)
                .and_then(Value::as_str)
                .map(str::to_owned)
                .ok_or_else(|| ManifestError::MissingField {
                    path: origin.to_path_buf(),
                    field,
                })
        };
        let name = field("name")?;
        let version = field("version")?;

        let dev_dependencies = raw
            .get("devDependencies")
            .and_then(Value::as_object)
            .map(|deps| deps.keys().cloned().collect())
            .unwrap_or_default();

        Ok(Self {
            name,
            version,
            dev_dependencies,
            raw,
        })
    }

    /// `<name>-<version>`
    pub fn package_name(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }

    /// `<name>-<version>.tar.gz`
    pub fn archive_file_name(&self) -> String {
        format!("{}.tar.gz", self.package_name())
    }

    /// `node_modules/<dep>` for every development-only dependency.
    pub fn exclude_set(&self) -> ExcludeSet {
        ExcludeSet::new(
            self.dev_dependencies
                .iter()
                .map(|dep| Path::new(DEPENDENCY_DIR).join(dep)),
        )
    }

    /// The full manifest with `version` replaced; every other field is kept as is.
    pub fn with_version(&self, version: &str) -> Value {
        let mut raw = self.raw.clone();
        raw.insert("version".to_string(), Value::String(version.to_string()));
        Value::Object(raw)
    }
}

/// Make the host application accept the plugin by writing a manifest copy whose
/// `version` matches the host's, into `plugin_dir/package.json`.
///
/// Nothing is written when the versions already agree. A missing or unreadable
/// host manifest is fatal.
pub fn trick_manifest_version(
    project: &Manifest,
    host_manifest_path: &Path,
    plugin_dir: &Path,
) -> Result<TrickOutcome, ManifestError> {
    let host = Manifest::load(host_manifest_path)?;

    if host.version == project.version {
        info!(version = %project.version, "[TRICK] Host and plugin versions already match, nothing to write");
        return Ok(TrickOutcome::AlreadyMatching {
            version: project.version.clone(),
        });
    }

    let path = plugin_dir.join("package.json");
    let derived = project.with_version(&host.version);
    let mut json =
        serde_json::to_string_pretty(&derived).map_err(|source| ManifestError::Serialize {
            path: path.clone(),
            source,
        })?;
    json.push('\n');

    let write = |path: &Path| -> std::io::Result<()> {
        std::fs::create_dir_all(plugin_dir)?;
        std::fs::write(path, json.as_bytes())
    };
    write(&path).map_err(|source| {
        error!(error = ?source, path = %path.display(), "[TRICK] Failed to write derived manifest");
        ManifestError::Write {
            path: path.clone(),
            source,
        }
    })?;
    debug!(json = %json, "[TRICK] Derived manifest contents");
    info!(
        path = %path.display(),
        from = %project.version,
        to = %host.version,
        "[TRICK] Wrote manifest with host version"
    );

    Ok(TrickOutcome::Written {
        path,
        from: project.version.clone(),
        to: host.version,
    })
}

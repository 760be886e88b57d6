// Shared fixture: a small plugin project next to a fake host checkout.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use plugin_release_core::config::PipelineConfig;
use tempfile::TempDir;
use walkdir::WalkDir;

pub const PLUGIN_MANIFEST: &str = r#"{
  "name": "timelion-extras",
  "version": "1.2.0",
  "description": "Extra timelion functions",
  "main": "index.js",
  "dependencies": {
    "lodash": "^4.0.0"
  },
  "devDependencies": {
    "eslint": "^3.0.0",
    "@babel/core": "^7.0.0"
  }
}
"#;

pub struct Workspace {
    pub dir: TempDir,
    pub project: PathBuf,
    pub host: PathBuf,
}

impl Workspace {
    pub fn config(&self) -> PipelineConfig {
        let mut config = PipelineConfig::for_project(&self.project);
        config.host_root = self.host.clone();
        config
    }

    pub fn host_plugin_dir(&self) -> PathBuf {
        self.host.join("plugins").join("timelion-extras")
    }
}

pub fn write(path: &Path, contents: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

/// Plugin project with runtime and dev dependencies installed, plus a host at version 6.0.0.
pub fn workspace() -> Workspace {
    let dir = tempfile::tempdir().unwrap();
    let project = dir.path().join("timelion-extras");
    let host = dir.path().join("kibana");

    write(&project.join("package.json"), PLUGIN_MANIFEST);
    write(
        &project.join("index.js"),
        "module.exports = function (kibana) {\n  return new kibana.Plugin({});\n};\n",
    );
    write(
        &project.join("functions/movingaverage.js"),
        "module.exports = function movingaverage() {\n  return 1;\n};\n",
    );
    write(
        &project.join("functions/lib/helpers.js"),
        "exports.noop = function () {};\n",
    );
    write(&project.join("node_modules/lodash/index.js"), "module.exports = {};\n");
    write(&project.join("node_modules/lodash/package.json"), "{\"name\":\"lodash\"}\n");
    write(&project.join("node_modules/eslint/lib/api.js"), "// dev only\n");
    write(&project.join("node_modules/@babel/core/index.js"), "// dev only\n");
    write(&project.join("README.md"), "# not shipped\n");
    write(&project.join("gulpfile.js"), "// not shipped\n");

    write(
        &host.join("package.json"),
        "{\n  \"name\": \"kibana\",\n  \"version\": \"6.0.0\"\n}\n",
    );

    Workspace { dir, project, host }
}

/// Every file under `root` (relative path → contents). Directories map to `None`.
pub fn snapshot(root: &Path) -> BTreeMap<PathBuf, Option<Vec<u8>>> {
    WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .map(|entry| entry.unwrap())
        .map(|entry| {
            let relative = entry.path().strip_prefix(root).unwrap().to_path_buf();
            let contents = if entry.file_type().is_dir() {
                None
            } else {
                Some(fs::read(entry.path()).unwrap())
            };
            (relative, contents)
        })
        .collect()
}

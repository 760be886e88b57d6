use assert_cmd::Command;
use flate2::read::GzDecoder;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write(path: &Path, contents: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

/// A plugin project with a config file that releases into a local directory.
fn create_project() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("Creating temp dir failed");
    let project = dir.path().join("timelion-extras");
    write(
        &project.join("package.json"),
        "{\n  \"name\": \"timelion-extras\",\n  \"version\": \"1.2.0\",\n  \"devDependencies\": {\"eslint\": \"^3.0.0\"}\n}\n",
    );
    write(&project.join("index.js"), "module.exports = {};\n");
    write(&project.join("functions/scale.js"), "module.exports = 2;\n");
    write(&project.join("node_modules/lodash/index.js"), "module.exports = {};\n");
    write(&project.join("node_modules/eslint/index.js"), "// dev only\n");
    write(
        &dir.path().join("kibana/package.json"),
        "{\"name\": \"kibana\", \"version\": \"6.0.0\"}\n",
    );
    write(
        &project.join("plugin-release.yaml"),
        "host_root: ../kibana\nrelease:\n  timeout_secs: 30\n  store:\n    type: local\n    path: published\n",
    );
    (dir, project)
}

fn cli(project: &Path) -> Command {
    let mut cmd = Command::cargo_bin("plugin-release").expect("Binary exists");
    cmd.arg("--config").arg(project.join("plugin-release.yaml"));
    cmd
}

#[test]
fn test_command_lints_then_reports_nothing_to_test() {
    let (_dir, project) = create_project();

    cli(&project)
        .arg("test")
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing to test..."))
        .stdout(predicate::str::contains("[lint]").not());
}

#[test]
fn lint_with_relative_config_path_reads_each_file_once() {
    let (dir, project) = create_project();
    let mut relative = Command::cargo_bin("plugin-release").expect("Binary exists");
    relative
        .current_dir(dir.path())
        .arg("--config")
        .arg("timelion-extras/plugin-release.yaml")
        .arg("lint");

    relative.assert().success().stdout(predicate::str::contains("[lint]").not());

    write(&project.join("functions/broken.js"), "debugger;\n");
    Command::cargo_bin("plugin-release")
        .expect("Binary exists")
        .current_dir(dir.path())
        .arg("--config")
        .arg("timelion-extras/plugin-release.yaml")
        .arg("test")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("functions/broken.js:1:1"))
        .stderr(predicate::str::contains("No such file").not());
}

#[test]
fn lint_violation_exits_non_zero_with_diagnostics() {
    let (_dir, project) = create_project();
    write(&project.join("functions/broken.js"), "debugger;\n");

    cli(&project)
        .arg("lint")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("functions/broken.js:1:1"))
        .stderr(predicate::str::contains("[no-debugger]"))
        .stderr(predicate::str::contains("[ERROR] lint failed"));
}

#[test]
fn sync_installs_plugin_into_host() {
    let (dir, project) = create_project();

    cli(&project).arg("sync").assert().success();

    let installed = dir.path().join("kibana/plugins/timelion-extras");
    assert!(installed.join("functions/scale.js").is_file());
    assert!(installed.join("node_modules/lodash/index.js").is_file());
    assert!(!installed.join("node_modules/eslint").exists());
    assert!(!installed.join("plugin-release.yaml").exists());
}

#[test]
fn trick_manifest_version_accepts_camel_case_alias() {
    let (dir, project) = create_project();

    cli(&project)
        .arg("trickManifestVersion")
        .assert()
        .success()
        .stdout(predicate::str::contains("now reports 6.0.0 (was 1.2.0)"));

    let written =
        fs::read_to_string(dir.path().join("kibana/plugins/timelion-extras/package.json")).unwrap();
    let written: serde_json::Value = serde_json::from_str(&written).unwrap();
    assert_eq!(written["version"], "6.0.0");
    assert_eq!(written["name"], "timelion-extras");
}

#[test]
fn release_to_local_store_publishes_both_keys() {
    let (_dir, project) = create_project();
    fs::create_dir_all(project.join("build/stale")).unwrap();

    cli(&project)
        .arg("release")
        .assert()
        .success()
        .stdout(predicate::str::contains("[release] Available at").count(2));

    assert!(!project.join("build/stale").exists());
    let published = project.join("published/elastic/timelion-extras");
    let latest = fs::read(published.join("timelion-extras-latest.tar.gz")).unwrap();
    let pinned = fs::read(published.join("timelion-extras-1.2.0.tar.gz")).unwrap();
    assert_eq!(latest, pinned);
    assert_eq!(
        latest,
        fs::read(project.join("target/timelion-extras-1.2.0.tar.gz")).unwrap()
    );

    let mut archive = tar::Archive::new(GzDecoder::new(latest.as_slice()));
    let entries: Vec<PathBuf> = archive
        .entries()
        .unwrap()
        .map(|e| e.unwrap().path().unwrap().into_owned())
        .collect();
    assert!(entries.contains(&PathBuf::from("timelion-extras/functions/scale.js")));
    assert!(!entries
        .iter()
        .any(|p| p.starts_with("timelion-extras/node_modules/eslint")));
}

#[test]
fn clean_removes_build_and_target() {
    let (_dir, project) = create_project();
    write(&project.join("build/timelion-extras/index.js"), "x\n");
    write(&project.join("target/timelion-extras-1.2.0.tar.gz"), "x");

    cli(&project).arg("clean").assert().success();

    assert!(!project.join("build").exists());
    assert!(!project.join("target").exists());
    assert!(project.join("index.js").is_file());
}

#[test]
fn missing_config_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();

    Command::cargo_bin("plugin-release")
        .expect("Binary exists")
        .arg("--config")
        .arg(dir.path().join("nope.yaml"))
        .arg("sync")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("[ERROR] Failed to read config file"));
}

use std::sync::{Arc, Mutex};
use tracing_subscriber::prelude::*; // needed for .with()
use tracing_subscriber::{layer::Context, Layer, Registry};

/// Custom Layer to collect emitted event messages.
struct EventCollector {
    events: Arc<Mutex<Vec<String>>>,
}

impl<S> Layer<S> for EventCollector
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        use std::fmt::Write as FmtWrite;
        let mut msg = String::new();
        let _ = write!(&mut msg, "{:?}", event);
        self.events.lock().unwrap().push(msg);
    }
}

#[tokio::test]
async fn emits_trace_initialised_event() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let collector = EventCollector {
        events: events.clone(),
    };
    let subscriber = Registry::default().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    use plugin_release::cli::{run, Cli, Commands};

    // A config path that does not exist still gets past the first event.
    let cli = Cli {
        config: Some(PathBuf::from("dummy.yaml")),
        command: Commands::Sync,
    };

    let _ = run(cli).await;

    let event_msgs = events.lock().unwrap();
    assert!(
        event_msgs.iter().any(|msg| msg.contains("trace_initialised")),
        "Expected a 'trace_initialised' trace event, got: {:?}",
        event_msgs
    );
}

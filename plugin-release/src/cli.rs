/// # plugin-release CLI Interface (Module)
///
/// Command parsing and orchestration for the `plugin-release` binary. Every
/// subcommand maps to one pipeline stage of [`plugin-release-core`], except
/// `dev`, which runs the watch loop until Ctrl-C.
///
/// ## How To Use
/// - Command-line users: `plugin-release --help`.
/// - Programmatic/integration use: call [`run`] with a constructed [`Cli`].
///
/// Stage logic lives in `plugin-release-core`; this module only wires config,
/// linter and release store together and prints a summary per stage.
///
/// [`plugin-release-core`]: ../../plugin_release_core/
use crate::load_config::{resolve_config, CliConfig};
use crate::store::BucketClient;
use anyhow::Result;
use clap::{Parser, Subcommand};
use plugin_release_core::config::LintConfig;
use plugin_release_core::contract::{ArtifactStore, Linter};
use plugin_release_core::lint::{BuiltinLinter, CommandLinter};
use plugin_release_core::manifest::TrickOutcome;
use plugin_release_core::pipeline::{Pipeline, Stage, StageOutcome};
use plugin_release_core::watch::{dev, DevEvent, DevState};
use std::path::PathBuf;
use std::sync::Arc;

/// CLI for plugin-release: sync, lint, package and publish a host-application plugin.
#[derive(Parser)]
#[clap(
    name = "plugin-release",
    version,
    about = "Sync, lint, package and publish a host-application plugin tarball"
)]
pub struct Cli {
    /// Path to the YAML config file (defaults to ./plugin-release.yaml when present)
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Mirror the include set into the host application's plugin directory
    Sync,
    /// Run the linter over the configured source patterns
    Lint,
    /// Lint, then report that there is nothing else to test
    Test,
    /// Remove the build and target directories
    Clean,
    /// Clean, then stage the include set into the build directory
    Build,
    /// Build, then archive the build directory as <name>-<version>.tar.gz
    Package,
    /// Package, then upload the archive to its latest and versioned keys
    Release,
    /// Write a manifest copy carrying the host application's version
    #[clap(name = "trick-manifest-version", alias = "trickManifestVersion")]
    TrickManifestVersion,
    /// Sync, align the manifest version, then re-sync and re-lint on every change
    Dev,
}

impl Commands {
    /// The pipeline stage this command requests; `None` for the dev loop.
    pub fn stage(self) -> Option<Stage> {
        match self {
            Commands::Sync => Some(Stage::Sync),
            Commands::Lint => Some(Stage::Lint),
            Commands::Test => Some(Stage::Test),
            Commands::Clean => Some(Stage::Clean),
            Commands::Build => Some(Stage::Build),
            Commands::Package => Some(Stage::Package),
            Commands::Release => Some(Stage::Release),
            Commands::TrickManifestVersion => Some(Stage::TrickManifestVersion),
            Commands::Dev => None,
        }
    }
}

/// Async CLI entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    let config = resolve_config(cli.config.as_deref())?;
    config.pipeline.trace_loaded();
    let pipeline = build_pipeline(config)?;

    let Some(stage) = cli.command.stage() else {
        tracing::info!(command = "dev", "Starting dev loop, press Ctrl-C to stop");
        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            }
        };
        dev(&pipeline, shutdown, print_dev_event).await?;
        return Ok(());
    };

    tracing::info!(command = %stage, "Running pipeline");
    match pipeline.run(&[stage]).await {
        Ok(report) => {
            for (stage, outcome) in &report.stages {
                if let Some(line) = summarize(*stage, outcome) {
                    println!("{line}");
                }
            }
            tracing::info!(command = %stage, ran = ?report.ran(), "Pipeline complete");
            Ok(())
        }
        Err(e) => {
            tracing::error!(command = %stage, error = %e, "Pipeline failed");
            Err(anyhow::Error::new(e).context(format!("{stage} failed")))
        }
    }
}

fn build_pipeline(config: CliConfig) -> Result<Pipeline> {
    let linter = build_linter(&config.pipeline.lint);
    let store: Arc<dyn ArtifactStore> = Arc::new(BucketClient::new(
        config.store,
        config.pipeline.release.bucket.clone(),
    ));
    Ok(Pipeline::load(config.pipeline, linter, store)?)
}

/// External command when configured, builtin rules otherwise.
pub fn build_linter(lint: &LintConfig) -> Arc<dyn Linter> {
    match CommandLinter::from_command(&lint.command) {
        Some(linter) => Arc::new(linter),
        None => Arc::new(BuiltinLinter::new(lint.max_line_length)),
    }
}

/// One line describing what a stage did; `None` for stages that stay quiet on success.
pub fn summarize(stage: Stage, outcome: &StageOutcome) -> Option<String> {
    let line = match outcome {
        StageOutcome::Synced(report) | StageOutcome::Built(report) => format!(
            "[{stage}] {} ({} copied, {} unchanged, {} removed)",
            report.destination.display(),
            report.copied,
            report.unchanged,
            report.removed
        ),
        // a clean lint prints nothing, like the linter itself
        StageOutcome::Linted(_) => return None,
        StageOutcome::Tested => format!("[{stage}] Nothing to test..."),
        StageOutcome::Cleaned(report) => format!(
            "[{stage}] removed {} director{}",
            report.removed.len(),
            if report.removed.len() == 1 { "y" } else { "ies" }
        ),
        StageOutcome::Packaged(report) => format!(
            "[{stage}] {} ({} entries, {} bytes)",
            report.archive_path.display(),
            report.entries,
            report.bytes
        ),
        StageOutcome::Released(report) => report
            .receipts
            .iter()
            .map(|receipt| format!("[{stage}] Available at {}", receipt.location))
            .collect::<Vec<_>>()
            .join("\n"),
        StageOutcome::ManifestTricked(TrickOutcome::Written { path, from, to }) => {
            format!("[{stage}] {} now reports {to} (was {from})", path.display())
        }
        StageOutcome::ManifestTricked(TrickOutcome::AlreadyMatching { version }) => {
            format!("[{stage}] versions already match ({version}), nothing written")
        }
    };
    Some(line)
}

fn print_dev_event(event: DevEvent) {
    match event {
        DevEvent::Ready { watched } => {
            for path in watched {
                println!("[dev] watching {}", path.display());
            }
        }
        DevEvent::Changed { paths } => {
            println!("[dev] {} path(s) changed", paths.len());
        }
        DevEvent::State(DevState::Idle) => {}
        DevEvent::State(state) => println!("[dev] {state:?}"),
        DevEvent::CycleFinished { error: None } => println!("[dev] up to date"),
        DevEvent::CycleFinished { error: Some(e) } => eprintln!("[ERROR] {e}"),
        DevEvent::Shutdown => println!("[dev] stopped"),
    }
}

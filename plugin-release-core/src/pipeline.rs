//! High-level pipeline: an explicit stage graph and the scheduler that runs it.
//!
//! Every command maps to a [`Stage`]. A stage declares its prerequisites via
//! [`Stage::dependencies`]; [`plan`] expands the requested stages to their full
//! prerequisite closure and orders it topologically. [`Pipeline::run`] then
//! executes that order, each stage at most once, and stops at the first failure.
//!
//! # Stages
//! - `sync`: mirror the include set into the host plugin directory
//! - `lint` / `test`: static analysis gate (`test` only adds a notice)
//! - `clean` → `build` → `package` → `release`: the release chain
//! - `trickManifestVersion`: align the installed manifest with the host version
//!
//! # Error Handling
//! Stage errors are returned as [`PipelineError`] immediately; dependents never run.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use tracing::{error, info, warn};

use crate::clean::{clean, CleanReport};
use crate::config::PipelineConfig;
use crate::contract::{ArtifactStore, Linter};
use crate::error::PipelineError;
use crate::lint::{run_lint, LintReport};
use crate::manifest::{trick_manifest_version, Manifest, TrickOutcome};
use crate::package::{package, PackageReport};
use crate::release::{release, release_keys, ReleaseReport};
use crate::sync::{sync_to, SyncPlan, SyncReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Sync,
    Lint,
    Test,
    Clean,
    Build,
    Package,
    Release,
    TrickManifestVersion,
}

impl Stage {
    pub const ALL: [Stage; 8] = [
        Stage::Sync,
        Stage::Lint,
        Stage::Test,
        Stage::Clean,
        Stage::Build,
        Stage::Package,
        Stage::Release,
        Stage::TrickManifestVersion,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stage::Sync => "sync",
            Stage::Lint => "lint",
            Stage::Test => "test",
            Stage::Clean => "clean",
            Stage::Build => "build",
            Stage::Package => "package",
            Stage::Release => "release",
            Stage::TrickManifestVersion => "trickManifestVersion",
        }
    }

    /// Stages that must complete, in the same run, before this one starts.
    pub fn dependencies(self) -> &'static [Stage] {
        match self {
            Stage::Test => &[Stage::Lint],
            Stage::Build => &[Stage::Clean],
            Stage::Package => &[Stage::Build],
            Stage::Release => &[Stage::Package],
            Stage::Sync | Stage::Lint | Stage::Clean | Stage::TrickManifestVersion => &[],
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.name() == s)
            .or(match s {
                "trick-manifest-version" => Some(Stage::TrickManifestVersion),
                _ => None,
            })
            .ok_or_else(|| format!("unknown stage `{s}`"))
    }
}

/// Expand `targets` to their prerequisite closure in execution order.
pub fn plan(targets: &[Stage]) -> Result<Vec<Stage>, PipelineError> {
    let mut graph: DiGraphMap<Stage, ()> = DiGraphMap::new();
    let mut queue: VecDeque<Stage> = targets.iter().copied().collect();
    while let Some(stage) = queue.pop_front() {
        if graph.contains_node(stage) {
            continue;
        }
        graph.add_node(stage);
        for dependency in stage.dependencies() {
            queue.push_back(*dependency);
        }
    }
    let nodes: Vec<Stage> = graph.nodes().collect();
    for stage in nodes {
        for dependency in stage.dependencies() {
            graph.add_edge(*dependency, stage, ());
        }
    }
    toposort(&graph, None).map_err(|cycle| PipelineError::Cycle(cycle.node_id().name()))
}

#[derive(Debug)]
pub enum StageOutcome {
    Synced(SyncReport),
    Linted(LintReport),
    Tested,
    Cleaned(CleanReport),
    Built(SyncReport),
    Packaged(PackageReport),
    Released(ReleaseReport),
    ManifestTricked(TrickOutcome),
}

#[derive(Debug, Default)]
pub struct PipelineReport {
    pub stages: Vec<(Stage, StageOutcome)>,
}

impl PipelineReport {
    pub fn outcome(&self, stage: Stage) -> Option<&StageOutcome> {
        self.stages
            .iter()
            .find(|(ran, _)| *ran == stage)
            .map(|(_, outcome)| outcome)
    }

    pub fn ran(&self) -> Vec<Stage> {
        self.stages.iter().map(|(stage, _)| *stage).collect()
    }
}

/// One plugin project wired to its linter and release store.
pub struct Pipeline {
    config: PipelineConfig,
    manifest: Manifest,
    linter: Arc<dyn Linter>,
    store: Arc<dyn ArtifactStore>,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        manifest: Manifest,
        linter: Arc<dyn Linter>,
        store: Arc<dyn ArtifactStore>,
    ) -> Self {
        Self {
            config,
            manifest,
            linter,
            store,
        }
    }

    /// Read the project manifest named by `config` and build the pipeline.
    pub fn load(
        config: PipelineConfig,
        linter: Arc<dyn Linter>,
        store: Arc<dyn ArtifactStore>,
    ) -> Result<Self, PipelineError> {
        let manifest = Manifest::load(&config.manifest_path())?;
        Ok(Self::new(config, manifest, linter, store))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn sync_plan(&self) -> SyncPlan {
        SyncPlan {
            source_root: self.config.project_root.clone(),
            include: self.config.include.clone(),
            exclude: self.manifest.exclude_set(),
        }
    }

    /// Run `targets` and their prerequisites; each stage runs at most once.
    pub async fn run(&self, targets: &[Stage]) -> Result<PipelineReport, PipelineError> {
        let order = plan(targets)?;
        info!(
            targets = ?targets,
            order = ?order,
            plugin = %self.manifest.package_name(),
            "[PIPELINE] Starting run"
        );

        let mut report = PipelineReport::default();
        let mut packaged: Option<PackageReport> = None;
        for stage in order {
            info!(stage = %stage, "[PIPELINE] Stage starting");
            let outcome = match self.run_stage(stage, packaged.as_ref()).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(stage = %stage, error = %e, "[PIPELINE][ERROR] Stage failed");
                    return Err(e);
                }
            };
            if let StageOutcome::Packaged(package_report) = &outcome {
                packaged = Some(package_report.clone());
            }
            info!(stage = %stage, "[PIPELINE] Stage finished");
            report.stages.push((stage, outcome));
        }
        Ok(report)
    }

    async fn run_stage(
        &self,
        stage: Stage,
        packaged: Option<&PackageReport>,
    ) -> Result<StageOutcome, PipelineError> {
        let name = &self.manifest.name;
        match stage {
            Stage::Sync => {
                let destination = self.config.host_plugin_dir(name);
                Ok(StageOutcome::Synced(
                    sync_to(&self.sync_plan(), &destination).await?,
                ))
            }
            Stage::Lint => {
                let report = run_lint(
                    self.linter.as_ref(),
                    &self.config.project_root,
                    &self.config.lint.patterns,
                )?;
                if !report.is_clean() {
                    return Err(PipelineError::LintViolations {
                        count: report.diagnostics.len(),
                    });
                }
                Ok(StageOutcome::Linted(report))
            }
            Stage::Test => {
                warn!("[TEST] Nothing to test...");
                Ok(StageOutcome::Tested)
            }
            Stage::Clean => Ok(StageOutcome::Cleaned(
                clean(&[self.config.build_dir.as_path(), self.config.target_dir.as_path()]).await?,
            )),
            Stage::Build => {
                let destination = self.config.build_target(name);
                Ok(StageOutcome::Built(
                    sync_to(&self.sync_plan(), &destination).await?,
                ))
            }
            Stage::Package => Ok(StageOutcome::Packaged(
                package(
                    &self.config.build_dir,
                    &self.config.target_dir,
                    &self.manifest.archive_file_name(),
                )
                .await?,
            )),
            Stage::Release => {
                let packaged = packaged.ok_or(PipelineError::MissingPrerequisite {
                    stage: Stage::Release.name(),
                    missing: Stage::Package.name(),
                })?;
                let keys = release_keys(&self.config.release, &self.manifest);
                Ok(StageOutcome::Released(
                    release(
                        Arc::clone(&self.store),
                        &packaged.archive_path,
                        &keys,
                        self.config.release.timeout,
                    )
                    .await?,
                ))
            }
            Stage::TrickManifestVersion => Ok(StageOutcome::ManifestTricked(
                trick_manifest_version(
                    &self.manifest,
                    &self.config.host_manifest_path(),
                    &self.config.host_plugin_dir(name),
                )?,
            )),
        }
    }
}

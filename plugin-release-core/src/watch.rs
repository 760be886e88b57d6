//! Dev loop: sync once, then re-sync and re-lint whenever a watched path changes.
//!
//! States go `Idle → Syncing → Linting → Idle`. A failed cycle is reported and
//! the loop keeps watching. Notifications that pile up while a cycle runs are
//! merged into the next cycle.

use std::collections::BTreeSet;
use std::future::Future;
use std::path::{Path, PathBuf};

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::error::{PipelineError, WatchError};
use crate::pipeline::{Pipeline, Stage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DevState {
    Idle,
    Syncing,
    Linting,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DevEvent {
    /// Initial sync done, watcher armed on these paths.
    Ready { watched: Vec<PathBuf> },
    Changed { paths: Vec<PathBuf> },
    State(DevState),
    CycleFinished { error: Option<String> },
    Shutdown,
}

/// Run the dev loop until `shutdown` resolves.
pub async fn dev<F>(
    pipeline: &Pipeline,
    shutdown: F,
    on_event: impl Fn(DevEvent),
) -> Result<(), WatchError>
where
    F: Future<Output = ()>,
{
    // separate runs: the derived manifest must land after the mirror copy
    for stage in [Stage::Sync, Stage::TrickManifestVersion] {
        pipeline
            .run(&[stage])
            .await
            .map_err(|e| WatchError::Startup(Box::new(e)))?;
    }

    let config = pipeline.config();
    let mut filter = WatchFilter::default();
    let mut watched = Vec::new();
    for path in &config.watch.paths {
        let full = config.project_path(path);
        if !full.exists() {
            warn!(path = %full.display(), "[DEV] Watch path does not exist, skipping");
            continue;
        }
        // events carry the path the watch was registered with
        let target = full.canonicalize().unwrap_or_else(|_| full.clone());
        if target.is_dir() {
            filter.dirs.push(target);
        } else {
            filter.files.push(target);
        }
        watched.push(full);
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<PathBuf>>();
    let relevant = filter.clone();
    let mut watcher = RecommendedWatcher::new(
        move |res: Result<Event, notify::Error>| match res {
            Ok(event) if is_change(&event.kind) => {
                let paths: Vec<PathBuf> = event
                    .paths
                    .into_iter()
                    .filter(|path| relevant.matches(path))
                    .collect();
                if !paths.is_empty() {
                    let _ = tx.send(paths);
                }
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "[DEV] Watcher reported an error"),
        },
        Config::default(),
    )?;

    for dir in &filter.dirs {
        watcher.watch(dir, RecursiveMode::Recursive)?;
    }
    // through the directory, so a temp file renamed over a watched file still counts
    for parent in filter.file_parents() {
        watcher.watch(&parent, RecursiveMode::NonRecursive)?;
    }
    info!(watched = ?watched, "[DEV] Watching for changes");
    on_event(DevEvent::Ready { watched });

    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            changed = rx.recv() => {
                let Some(mut paths) = changed else { break };
                while let Ok(more) = rx.try_recv() {
                    paths.extend(more);
                }
                paths.sort();
                paths.dedup();
                debug!(paths = ?paths, "[DEV] Change detected");
                on_event(DevEvent::Changed { paths });
                // failures are already reported through events and logs
                let _ = run_cycle(pipeline, &on_event).await;
            }
        }
    }

    drop(watcher);
    info!("[DEV] Watcher stopped");
    on_event(DevEvent::Shutdown);
    Ok(())
}

/// One `Syncing → Linting → Idle` pass. Lint is skipped when sync fails.
pub async fn run_cycle(
    pipeline: &Pipeline,
    on_event: &impl Fn(DevEvent),
) -> Result<(), PipelineError> {
    on_event(DevEvent::State(DevState::Syncing));
    let mut result = pipeline.run(&[Stage::Sync]).await.map(|_| ());
    if result.is_ok() {
        on_event(DevEvent::State(DevState::Linting));
        result = pipeline.run(&[Stage::Lint]).await.map(|_| ());
    }
    on_event(DevEvent::State(DevState::Idle));

    if let Err(e) = &result {
        error!(error = %e, "[DEV] Cycle failed, waiting for the next change");
    }
    on_event(DevEvent::CycleFinished {
        error: result.as_ref().err().map(ToString::to_string),
    });
    result
}

/// Directories match their whole subtree, files only themselves.
#[derive(Debug, Clone, Default)]
struct WatchFilter {
    dirs: Vec<PathBuf>,
    files: Vec<PathBuf>,
}

impl WatchFilter {
    fn matches(&self, path: &Path) -> bool {
        self.files.iter().any(|file| file == path)
            || self.dirs.iter().any(|dir| path.starts_with(dir))
    }

    /// Parent directories of watched files not already under a recursive watch.
    fn file_parents(&self) -> BTreeSet<PathBuf> {
        self.files
            .iter()
            .filter_map(|file| file.parent())
            .filter(|parent| !self.dirs.iter().any(|dir| parent.starts_with(dir)))
            .map(Path::to_path_buf)
            .collect()
    }
}

fn is_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) | EventKind::Any
    )
}

//! Mirror copy of the include set into a destination directory.
//!
//! Used identically for local build staging and for installing into the host
//! application's plugin directory. For every include entry the destination
//! subtree ends up equal to the source subtree minus excluded paths: changed
//! files are copied, stale files are deleted, unchanged files are left alone.
//!
//! Entries are mirrored concurrently, one blocking task each; the first
//! failure is reported and the remaining tasks are left to finish on their own.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use futures::future::try_join_all;
use tracing::{debug, error, info};
use walkdir::WalkDir;

use crate::error::SyncError;

/// Paths (relative to the project root) that never reach a destination.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExcludeSet {
    paths: Vec<PathBuf>,
}

impl ExcludeSet {
    pub fn new(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            paths: paths.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Component-wise prefix match, so `node_modules/@scope/pkg` works and
    /// `node_modules/eslint` does not swallow `node_modules/eslint-plugin-x`.
    pub fn is_excluded(&self, relative: &Path) -> bool {
        self.paths.iter().any(|excluded| relative.starts_with(excluded))
    }
}

/// What to mirror and from where.
#[derive(Debug, Clone)]
pub struct SyncPlan {
    pub source_root: PathBuf,
    pub include: Vec<PathBuf>,
    pub exclude: ExcludeSet,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub destination: PathBuf,
    pub copied: usize,
    pub unchanged: usize,
    pub removed: usize,
}

impl SyncReport {
    fn absorb(&mut self, other: EntryReport) {
        self.copied += other.copied;
        self.unchanged += other.unchanged;
        self.removed += other.removed;
    }
}

#[derive(Debug, Default)]
struct EntryReport {
    copied: usize,
    unchanged: usize,
    removed: usize,
}

impl SyncPlan {
    /// Reject absolute, escaping or overlapping include entries before touching disk.
    pub fn validate(&self) -> Result<(), SyncError> {
        for entry in &self.include {
            let escapes = entry
                .components()
                .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
            if entry.as_os_str().is_empty() || escapes {
                return Err(SyncError::InvalidInclude {
                    entry: entry.clone(),
                });
            }
        }
        for (i, first) in self.include.iter().enumerate() {
            for second in &self.include[i + 1..] {
                if first.starts_with(second) || second.starts_with(first) {
                    return Err(SyncError::OverlappingInclude {
                        first: first.clone(),
                        second: second.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Mirror every include entry of `plan` into `destination`.
pub async fn sync_to(plan: &SyncPlan, destination: &Path) -> Result<SyncReport, SyncError> {
    plan.validate()?;

    tokio::fs::create_dir_all(destination).await.map_err(|source| {
        error!(error = ?source, path = %destination.display(), "[SYNC] Failed to create destination");
        SyncError::Io {
            path: destination.to_path_buf(),
            source,
        }
    })?;
    info!(
        destination = %destination.display(),
        entries = plan.include.len(),
        excluded = plan.exclude.paths().len(),
        "[SYNC] Mirroring include set"
    );

    let tasks = plan.include.iter().map(|entry| {
        let source_root = plan.source_root.clone();
        let destination = destination.to_path_buf();
        let exclude = plan.exclude.clone();
        let entry = entry.clone();
        async move {
            let task_entry = entry.clone();
            tokio::task::spawn_blocking(move || {
                mirror_entry(&source_root, &task_entry, &destination, &exclude)
            })
            .await
            .map_err(|e| SyncError::Task {
                entry,
                message: e.to_string(),
            })?
        }
    });

    let entries = try_join_all(tasks).await.map_err(|e| {
        error!(error = %e, "[SYNC][ERROR] Mirror copy failed");
        e
    })?;

    let mut report = SyncReport {
        destination: destination.to_path_buf(),
        ..SyncReport::default()
    };
    for entry in entries {
        report.absorb(entry);
    }
    info!(
        destination = %destination.display(),
        copied = report.copied,
        unchanged = report.unchanged,
        removed = report.removed,
        "[SYNC] Mirror complete"
    );
    Ok(report)
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> SyncError + '_ {
    move |source| SyncError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn mirror_entry(
    source_root: &Path,
    entry: &Path,
    destination_root: &Path,
    exclude: &ExcludeSet,
) -> Result<EntryReport, SyncError> {
    let source = source_root.join(entry);
    let target = destination_root.join(entry);
    let mut report = EntryReport::default();

    if exclude.is_excluded(entry) {
        report.removed += remove_node(&target)?;
        return Ok(report);
    }

    let metadata = match fs::symlink_metadata(&source) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(SyncError::MissingSource {
                entry: entry.to_path_buf(),
                path: source,
            })
        }
        Err(e) => return Err(io_err(&source)(e)),
    };

    if !metadata.is_dir() {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(io_err(parent))?;
        }
        copy_node(&source, &target, &metadata, &mut report)?;
        return Ok(report);
    }

    let mut expected: HashSet<PathBuf> = HashSet::new();
    let walker = WalkDir::new(&source)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| match e.path().strip_prefix(source_root) {
            Ok(relative) => !exclude.is_excluded(relative),
            Err(_) => true,
        });
    for item in walker {
        let item = item.map_err(|source_err| SyncError::Walk {
            root: source.clone(),
            source: source_err,
        })?;
        let relative = item.path().strip_prefix(&source).unwrap_or(item.path());
        let dest_path = if relative.as_os_str().is_empty() {
            target.clone()
        } else {
            target.join(relative)
        };
        expected.insert(relative.to_path_buf());

        let item_meta = fs::symlink_metadata(item.path()).map_err(io_err(item.path()))?;
        if item_meta.is_dir() {
            ensure_dir(&dest_path, &mut report)?;
        } else {
            copy_node(item.path(), &dest_path, &item_meta, &mut report)?;
        }
    }

    report.removed += remove_stale(&target, &expected)?;
    Ok(report)
}

/// Delete destination paths under `target` with no source counterpart.
fn remove_stale(target: &Path, expected: &HashSet<PathBuf>) -> Result<usize, SyncError> {
    let mut stale = Vec::new();
    let mut walker = WalkDir::new(target).follow_links(false).min_depth(1).into_iter();
    while let Some(item) = walker.next() {
        let item = item.map_err(|source| SyncError::Walk {
            root: target.to_path_buf(),
            source,
        })?;
        let relative = item.path().strip_prefix(target).unwrap_or(item.path());
        if !expected.contains(relative) {
            if item.file_type().is_dir() {
                walker.skip_current_dir();
            }
            stale.push(item.into_path());
        }
    }

    let mut removed = 0;
    for path in stale {
        removed += remove_node(&path)?;
    }
    Ok(removed)
}

fn remove_node(path: &Path) -> Result<usize, SyncError> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(io_err(path)(e)),
    };
    if metadata.is_dir() {
        fs::remove_dir_all(path).map_err(io_err(path))?;
    } else {
        fs::remove_file(path).map_err(io_err(path))?;
    }
    debug!(path = %path.display(), "[SYNC] Removed stale path");
    Ok(1)
}

fn ensure_dir(path: &Path, report: &mut EntryReport) -> Result<(), SyncError> {
    match fs::symlink_metadata(path) {
        Ok(metadata) if metadata.is_dir() => return Ok(()),
        Ok(_) => report.removed += remove_node(path)?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(io_err(path)(e)),
    }
    fs::create_dir_all(path).map_err(io_err(path))?;
    report.copied += 1;
    Ok(())
}

fn copy_node(
    source: &Path,
    target: &Path,
    metadata: &fs::Metadata,
    report: &mut EntryReport,
) -> Result<(), SyncError> {
    if metadata.file_type().is_symlink() {
        return copy_symlink(source, target, report);
    }

    let existing = match fs::symlink_metadata(target) {
        Ok(existing) => Some(existing),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => return Err(io_err(target)(e)),
    };
    if let Some(existing) = existing {
        if existing.is_file() && same_content_stamp(metadata, &existing) {
            report.unchanged += 1;
            return Ok(());
        }
        if existing.is_file() {
            // replaced rather than overwritten so read-only copies do not block the update
            fs::remove_file(target).map_err(io_err(target))?;
        } else {
            report.removed += remove_node(target)?;
        }
    }

    fs::copy(source, target).map_err(io_err(target))?;
    let modified = metadata.modified().map_err(io_err(source))?;
    stamp_modified(target, modified).map_err(io_err(target))?;
    debug!(source = %source.display(), target = %target.display(), "[SYNC] Copied file");
    report.copied += 1;
    Ok(())
}

/// Quick check: equal size and modification time mean the file is current.
fn same_content_stamp(source: &fs::Metadata, target: &fs::Metadata) -> bool {
    source.len() == target.len()
        && matches!((source.modified(), target.modified()), (Ok(a), Ok(b)) if a == b)
}

fn stamp_modified(path: &Path, modified: std::time::SystemTime) -> io::Result<()> {
    let file = match fs::File::options().write(true).open(path) {
        Ok(file) => file,
        // read-only copies can still be stamped by their owner
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => fs::File::open(path)?,
        Err(e) => return Err(e),
    };
    file.set_modified(modified)
}

#[cfg(unix)]
fn copy_symlink(source: &Path, target: &Path, report: &mut EntryReport) -> Result<(), SyncError> {
    let link = fs::read_link(source).map_err(io_err(source))?;
    match fs::symlink_metadata(target) {
        Ok(existing) if existing.file_type().is_symlink() => {
            if fs::read_link(target).ok().as_deref() == Some(link.as_path()) {
                report.unchanged += 1;
                return Ok(());
            }
            report.removed += remove_node(target)?;
        }
        Ok(_) => report.removed += remove_node(target)?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(io_err(target)(e)),
    }
    std::os::unix::fs::symlink(&link, target).map_err(io_err(target))?;
    report.copied += 1;
    Ok(())
}

#[cfg(not(unix))]
fn copy_symlink(source: &Path, _target: &Path, _report: &mut EntryReport) -> Result<(), SyncError> {
    tracing::warn!(path = %source.display(), "[SYNC] Skipping symlink, not supported on this platform");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(include: &[&str]) -> SyncPlan {
        SyncPlan {
            source_root: PathBuf::from("/src"),
            include: include.iter().map(PathBuf::from).collect(),
            exclude: ExcludeSet::default(),
        }
    }

    #[test]
    fn exclude_matches_whole_components_only() {
        let exclude = ExcludeSet::new([PathBuf::from("node_modules/eslint")]);
        assert!(exclude.is_excluded(Path::new("node_modules/eslint")));
        assert!(exclude.is_excluded(Path::new("node_modules/eslint/lib/api.js")));
        assert!(!exclude.is_excluded(Path::new("node_modules/eslint-plugin-react")));
        assert!(!exclude.is_excluded(Path::new("node_modules")));
    }

    #[test]
    fn validate_rejects_overlap_and_escapes() {
        assert!(plan(&["package.json", "functions"]).validate().is_ok());
        assert!(matches!(
            plan(&["functions", "functions/lib"]).validate(),
            Err(SyncError::OverlappingInclude { .. })
        ));
        assert!(matches!(
            plan(&["../outside"]).validate(),
            Err(SyncError::InvalidInclude { .. })
        ));
        assert!(matches!(
            plan(&["/etc"]).validate(),
            Err(SyncError::InvalidInclude { .. })
        ));
    }
}

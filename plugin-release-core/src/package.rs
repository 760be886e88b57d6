//! Package stage: archive the build directory into `<name>-<version>.tar.gz`.
//!
//! Entries keep their paths relative to the build directory, so a build target
//! of `build/<name>` yields entries under `<name>/`. Directory traversal is
//! sorted, which makes the archive layout stable for identical input; header
//! timestamps come from the files and are not normalised.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::{debug, error, info};
use walkdir::WalkDir;

use crate::error::PackageError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageReport {
    pub archive_path: PathBuf,
    pub entries: usize,
    pub bytes: u64,
}

/// Write `<target_dir>/<archive_name>` from the contents of `build_dir`.
pub async fn package(
    build_dir: &Path,
    target_dir: &Path,
    archive_name: &str,
) -> Result<PackageReport, PackageError> {
    if !tokio::fs::try_exists(build_dir).await.unwrap_or(false) {
        error!(path = %build_dir.display(), "[PACKAGE][ERROR] Build directory missing");
        return Err(PackageError::MissingBuildDir {
            path: build_dir.to_path_buf(),
        });
    }
    tokio::fs::create_dir_all(target_dir)
        .await
        .map_err(|source| PackageError::Io {
            path: target_dir.to_path_buf(),
            source,
        })?;

    let build_dir = build_dir.to_path_buf();
    let archive_path = target_dir.join(archive_name);
    info!(
        build_dir = %build_dir.display(),
        archive = %archive_path.display(),
        "[PACKAGE] Writing archive"
    );

    let report = tokio::task::spawn_blocking(move || write_archive(&build_dir, &archive_path))
        .await
        .map_err(|e| PackageError::Task(e.to_string()))??;

    info!(
        archive = %report.archive_path.display(),
        entries = report.entries,
        bytes = report.bytes,
        "[PACKAGE] Archive written"
    );
    Ok(report)
}

fn write_archive(build_dir: &Path, archive_path: &Path) -> Result<PackageReport, PackageError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| PackageError::Io { path, source }
    };

    let file = File::create(archive_path).map_err(io_err(archive_path))?;
    let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);

    let mut entries = 0;
    for item in WalkDir::new(build_dir)
        .follow_links(false)
        .sort_by_file_name()
        .min_depth(1)
    {
        let item = item.map_err(|source| PackageError::Walk {
            root: build_dir.to_path_buf(),
            source,
        })?;
        let relative = item.path().strip_prefix(build_dir).unwrap_or(item.path());
        if item.file_type().is_dir() {
            builder
                .append_dir(relative, item.path())
                .map_err(io_err(item.path()))?;
        } else {
            builder
                .append_path_with_name(item.path(), relative)
                .map_err(io_err(item.path()))?;
        }
        debug!(entry = %relative.display(), "[PACKAGE] Added entry");
        entries += 1;
    }

    let encoder = builder.into_inner().map_err(io_err(archive_path))?;
    let mut writer = encoder.finish().map_err(io_err(archive_path))?;
    writer.flush().map_err(io_err(archive_path))?;
    drop(writer);

    let bytes = std::fs::metadata(archive_path)
        .map_err(io_err(archive_path))?
        .len();
    Ok(PackageReport {
        archive_path: archive_path.to_path_buf(),
        entries,
        bytes,
    })
}

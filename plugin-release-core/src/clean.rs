//! Removal of previous build and release output.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{error, info};

use crate::error::CleanError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanReport {
    pub removed: Vec<PathBuf>,
    pub absent: Vec<PathBuf>,
}

/// Recursively delete each directory in turn. A directory that does not exist is skipped.
pub async fn clean(dirs: &[&Path]) -> Result<CleanReport, CleanError> {
    let mut report = CleanReport::default();
    for dir in dirs {
        match tokio::fs::remove_dir_all(dir).await {
            Ok(()) => {
                info!(path = %dir.display(), "[CLEAN] Removed directory");
                report.removed.push(dir.to_path_buf());
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(path = %dir.display(), "[CLEAN] Nothing to remove");
                report.absent.push(dir.to_path_buf());
            }
            Err(source) => {
                error!(error = ?source, path = %dir.display(), "[CLEAN][ERROR] Failed to remove directory");
                return Err(CleanError::Remove {
                    path: dir.to_path_buf(),
                    source,
                });
            }
        }
    }
    Ok(report)
}

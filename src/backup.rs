//! Backup snapshots taken before an organize pass.
//!
//! A snapshot is a plain copy of the folder tree under
//! `<folder>/<backup folder>/<YYYYmmdd-HHMMSS>/`. Organize never enters
//! subdirectories, so snapshots are not re-processed by later runs.

use crate::error::{OrganizeError, OrganizeResult};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Result of one backup.
#[derive(Debug)]
pub struct BackupReport {
    /// Directory holding this snapshot.
    pub snapshot_dir: PathBuf,
    pub copied_files: usize,
    pub copied_bytes: u64,
    /// Entries that could not be copied.
    pub errors: Vec<(PathBuf, String)>,
}

impl BackupReport {
    pub fn is_complete_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Copies the tree under `folder` into a new snapshot directory inside
/// `folder/backup_folder_name`.
///
/// The backup folder itself is never copied. Symlinks are not followed
/// and are left out of the snapshot.
///
/// # Errors
///
/// Fails only if `folder` is not a directory or the snapshot directory cannot
/// be created. Per-file failures are collected in the report.
pub fn create_backup(folder: &Path, backup_folder_name: &str) -> OrganizeResult<BackupReport> {
    if !folder.is_dir() {
        return Err(OrganizeError::not_a_directory(folder));
    }

    let backup_root = folder.join(backup_folder_name);
    let snapshot_dir = new_snapshot_dir(&backup_root)?;
    let mut report = BackupReport {
        snapshot_dir,
        copied_files: 0,
        copied_bytes: 0,
        errors: Vec::new(),
    };

    let walker = WalkDir::new(folder)
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| entry.path() != backup_root);

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e.path().unwrap_or(folder).to_path_buf();
                report.errors.push((path, e.to_string()));
                continue;
            }
        };

        let Ok(relative) = entry.path().strip_prefix(folder) else {
            continue;
        };
        let target = report.snapshot_dir.join(relative);

        let file_type = entry.file_type();
        if file_type.is_dir() {
            if let Err(e) = fs::create_dir_all(&target) {
                report.errors.push((entry.path().to_path_buf(), e.to_string()));
            }
        } else if file_type.is_file() {
            match fs::copy(entry.path(), &target) {
                Ok(bytes) => {
                    report.copied_files += 1;
                    report.copied_bytes += bytes;
                }
                Err(e) => {
                    let err = OrganizeError::FileCopyFailure {
                        from: entry.path().to_path_buf(),
                        to: target,
                        source: e,
                    };
                    warn!(error = %err, "backup copy failed");
                    report.errors.push((entry.path().to_path_buf(), err.to_string()));
                }
            }
        } else {
            debug!(path = %entry.path().display(), "not copying special file");
        }
    }

    info!(
        snapshot = %report.snapshot_dir.display(),
        files = report.copied_files,
        errors = report.errors.len(),
        "backup created"
    );
    Ok(report)
}

// Two backups within the same second get `-1`, `-2`, ... suffixes.
fn new_snapshot_dir(backup_root: &Path) -> OrganizeResult<PathBuf> {
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S").to_string();
    fs::create_dir_all(backup_root).map_err(|e| OrganizeError::DirectoryCreationFailed {
        path: backup_root.to_path_buf(),
        source: e,
    })?;

    let mut n = 0u32;
    loop {
        let name = if n == 0 {
            stamp.clone()
        } else {
            format!("{}-{}", stamp, n)
        };
        let candidate = backup_root.join(name);
        match fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => n += 1,
            Err(e) => {
                return Err(OrganizeError::DirectoryCreationFailed {
                    path: candidate,
                    source: e,
                });
            }
        }
    }
}

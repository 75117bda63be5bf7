//! Moving files into category directories.
//!
//! [`FileOrganizer::move_file`] relocates a single file without ever
//! overwriting anything, and [`FileOrganizer::organize`] runs a whole pass
//! over a folder: every regular file directly inside it is resolved to a
//! category and moved into the matching subdirectory. Per-file failures are
//! collected in the [`OrganizeReport`] and the pass carries on with the next
//! file.

use crate::config::CompiledFilters;
use crate::error::{OrganizeError, OrganizeResult};
use crate::file_category::{CategoryResolver, Resolved};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A completed file move, with enough information to reverse it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRecord {
    /// Where the file was before the move.
    pub source_path: PathBuf,
    /// Where the file is now.
    pub destination_path: PathBuf,
    /// When the move completed.
    pub timestamp: DateTime<Utc>,
}

/// A move that organize would perform, as reported by a dry run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedMove {
    pub source_path: PathBuf,
    pub destination_dir: PathBuf,
    pub category: Resolved,
}

/// Outcome of one organize pass.
#[derive(Debug, Clone)]
pub struct OrganizeReport {
    /// The folder that was organized.
    pub folder: PathBuf,
    pub started_at: DateTime<Utc>,
    /// Files moved per category label (`Images`, `Documents/PDF`, ...).
    pub counts: BTreeMap<String, usize>,
    /// Completed moves in the order they happened.
    pub move_records: Vec<MoveRecord>,
    /// Files that could not be moved, with the reason.
    pub errors: Vec<(PathBuf, String)>,
}

impl OrganizeReport {
    fn new(folder: &Path) -> Self {
        Self {
            folder: folder.to_path_buf(),
            started_at: Utc::now(),
            counts: BTreeMap::new(),
            move_records: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Total number of files moved.
    pub fn moved(&self) -> usize {
        self.move_records.len()
    }

    pub fn is_complete_success(&self) -> bool {
        self.errors.is_empty()
    }

    /// One-line summary for logs.
    pub fn summary(&self) -> String {
        format!(
            "folder={} moved={} errors={}",
            self.folder.display(),
            self.moved(),
            self.errors.len()
        )
    }
}

/// Sorts the files of a folder into category subdirectories.
#[derive(Debug)]
pub struct FileOrganizer {
    resolver: CategoryResolver,
    filters: CompiledFilters,
    protected: Vec<PathBuf>,
}

impl FileOrganizer {
    pub fn new(resolver: CategoryResolver, filters: CompiledFilters) -> Self {
        Self {
            resolver,
            filters,
            protected: Vec::new(),
        }
    }

    /// Files that organize must never move, such as foldersort's own logs
    /// when they live inside the organized folder.
    pub fn with_protected_paths(mut self, paths: impl IntoIterator<Item = PathBuf>) -> Self {
        self.protected
            .extend(paths.into_iter().map(|p| normalize_path(&p)));
        self
    }

    pub fn resolver(&self) -> &CategoryResolver {
        &self.resolver
    }

    /// Regular files directly inside `folder` that organize would handle,
    /// sorted by name.
    ///
    /// Subdirectories are never entered or moved, so category folders and the
    /// backup folder left by earlier runs are not processed again.
    ///
    /// # Errors
    ///
    /// Returns `OrganizeError::InvalidBasePath` if `folder` is not a readable
    /// directory.
    pub fn candidates(&self, folder: &Path) -> OrganizeResult<Vec<PathBuf>> {
        if !folder.is_dir() {
            return Err(OrganizeError::not_a_directory(folder));
        }

        let entries = fs::read_dir(folder).map_err(|e| OrganizeError::InvalidBasePath {
            path: folder.to_path_buf(),
            source: e,
        })?;

        let mut files: Vec<PathBuf> = entries
            .flatten()
            .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
            .map(|entry| entry.path())
            .filter(|path| !self.is_protected(path))
            .filter(|path| self.filters.should_include(path))
            .collect();
        files.sort();
        Ok(files)
    }

    /// Resolves every candidate without touching the filesystem.
    pub fn plan(&self, folder: &Path) -> OrganizeResult<Vec<PlannedMove>> {
        Ok(self
            .candidates(folder)?
            .into_iter()
            .map(|source_path| {
                let category = self.resolver.resolve_path(&source_path);
                PlannedMove {
                    destination_dir: folder.join(category.relative_dir()),
                    source_path,
                    category,
                }
            })
            .collect())
    }

    /// Runs one organize pass over `folder`.
    ///
    /// `on_move` is called right after each successful move so the caller can
    /// persist the record before the next file is touched; if it fails, the
    /// file stays moved and the failure is added to the report's errors.
    ///
    /// # Errors
    ///
    /// Only fails before any file is moved, when `folder` cannot be listed.
    pub fn organize<F>(&self, folder: &Path, mut on_move: F) -> OrganizeResult<OrganizeReport>
    where
        F: FnMut(&MoveRecord) -> OrganizeResult<()>,
    {
        let planned = self.plan(folder)?;
        let mut report = OrganizeReport::new(folder);
        info!(folder = %folder.display(), files = planned.len(), "organizing");

        for planned_move in planned {
            match Self::move_file(&planned_move.source_path, &planned_move.destination_dir) {
                Ok(record) => {
                    if let Err(e) = on_move(&record) {
                        warn!(error = %e, "move not recorded in undo log");
                        report.errors.push((
                            record.destination_path.clone(),
                            format!("moved, but not recorded for undo: {}", e),
                        ));
                    }
                    *report
                        .counts
                        .entry(planned_move.category.label())
                        .or_insert(0) += 1;
                    report.move_records.push(record);
                }
                Err(e) => {
                    warn!(error = %e, "could not organize file");
                    report
                        .errors
                        .push((planned_move.source_path, e.to_string()));
                }
            }
        }

        info!("{}", report.summary());
        Ok(report)
    }

    /// Moves `source` into `destination_folder` and records the move.
    ///
    /// The destination folder is created, including missing parents. If a
    /// file with the same name already exists there, the moved file gets a
    /// ` (n)` suffix before its extension; nothing is ever overwritten.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use foldersort::file_organizer::FileOrganizer;
    /// use std::path::Path;
    ///
    /// let record = FileOrganizer::move_file(
    ///     Path::new("/home/me/Downloads/photo.jpg"),
    ///     Path::new("/home/me/Downloads/Images"),
    /// );
    /// match record {
    ///     Ok(r) => println!("Moved to {}", r.destination_path.display()),
    ///     Err(e) => eprintln!("Move failed: {}", e),
    /// }
    /// ```
    pub fn move_file(source: &Path, destination_folder: &Path) -> OrganizeResult<MoveRecord> {
        let not_movable = |reason: &str| OrganizeError::FileMoveFailure {
            from: source.to_path_buf(),
            to: destination_folder.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, reason.to_string()),
        };

        match fs::symlink_metadata(source) {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Err(not_movable("not a regular file")),
            Err(e) => {
                return Err(OrganizeError::FileMoveFailure {
                    from: source.to_path_buf(),
                    to: destination_folder.to_path_buf(),
                    source: e,
                });
            }
        }

        let file_name = source
            .file_name()
            .ok_or_else(|| not_movable("file has no name component"))?;

        fs::create_dir_all(destination_folder).map_err(|e| {
            OrganizeError::DirectoryCreationFailed {
                path: destination_folder.to_path_buf(),
                source: e,
            }
        })?;

        let destination_path = unique_destination(destination_folder, file_name);
        fs::rename(source, &destination_path).map_err(|e| OrganizeError::FileMoveFailure {
            from: source.to_path_buf(),
            to: destination_path.clone(),
            source: e,
        })?;

        debug!(
            from = %source.display(),
            to = %destination_path.display(),
            "moved file"
        );

        Ok(MoveRecord {
            source_path: source.to_path_buf(),
            destination_path,
            timestamp: Utc::now(),
        })
    }

    fn is_protected(&self, path: &Path) -> bool {
        !self.protected.is_empty() && self.protected.contains(&normalize_path(path))
    }
}

/// First free path for `file_name` inside `folder`: `x.txt`, then
/// `x (1).txt`, `x (2).txt`, ...
pub fn unique_destination(folder: &Path, file_name: &std::ffi::OsStr) -> PathBuf {
    let candidate = folder.join(file_name);
    if !occupied(&candidate) {
        return candidate;
    }

    let as_path = Path::new(file_name);
    let stem = as_path
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_else(|| file_name.to_os_string());
    let extension = as_path.extension();

    (1u64..)
        .map(|n| {
            let mut name = OsString::from(&stem);
            name.push(format!(" ({})", n));
            if let Some(ext) = extension {
                name.push(".");
                name.push(ext);
            }
            folder.join(name)
        })
        .find(|path| !occupied(path))
        .unwrap_or(candidate)
}

// Broken symlinks count as occupied.
fn occupied(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Canonical form of `path`. A path that does not exist yet is made absolute
/// against the working directory, with its parent canonicalized when that
/// exists, so it compares equal to the canonical path it will have once
/// created.
pub(crate) fn normalize_path(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    match (absolute.parent(), absolute.file_name()) {
        (Some(parent), Some(name)) => parent
            .canonicalize()
            .map(|parent| parent.join(name))
            .unwrap_or(absolute),
        _ => absolute,
    }
}

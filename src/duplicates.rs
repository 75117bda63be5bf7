//! Content-based duplicate detection.
//!
//! Files are first bucketed by size, and only buckets with more than one file
//! are hashed. Hashing streams each file through SHA-256 in fixed-size chunks
//! so memory use does not depend on file size.

use crate::error::{OrganizeError, OrganizeResult};
use crate::file_organizer::normalize_path;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const CHUNK_SIZE: usize = 64 * 1024;

/// Files with identical content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateGroup {
    /// Hex-encoded SHA-256 of the shared content.
    pub digest: String,
    /// Size of each member in bytes.
    pub size: u64,
    /// Oldest first; the first member is the one kept by deletion.
    pub files: Vec<PathBuf>,
}

impl DuplicateGroup {
    /// The member kept by deletion, `None` for an empty group.
    pub fn original(&self) -> Option<&Path> {
        self.files.first().map(PathBuf::as_path)
    }

    /// Every member except the original.
    pub fn redundant(&self) -> &[PathBuf] {
        self.files.get(1..).unwrap_or_default()
    }

    /// Bytes freed by deleting the redundant members.
    pub fn wasted_bytes(&self) -> u64 {
        self.size * self.redundant().len() as u64
    }
}

/// Result of a duplicate scan.
#[derive(Debug, Default)]
pub struct ScanReport {
    pub groups: Vec<DuplicateGroup>,
    /// Regular files seen during the walk.
    pub scanned_files: usize,
    /// Entries that could not be listed or read.
    pub errors: Vec<(PathBuf, String)>,
}

impl ScanReport {
    pub fn duplicate_count(&self) -> usize {
        self.groups.iter().map(|g| g.redundant().len()).sum()
    }

    pub fn wasted_bytes(&self) -> u64 {
        self.groups.iter().map(DuplicateGroup::wasted_bytes).sum()
    }
}

/// Result of [`delete_duplicates`].
#[derive(Debug, Default)]
pub struct DeletionReport {
    pub deleted: Vec<PathBuf>,
    pub errors: Vec<(PathBuf, String)>,
}

/// Recursive duplicate scanner.
#[derive(Debug, Default, Clone)]
pub struct DuplicateFinder {
    skipped_dir_names: Vec<String>,
    protected: Vec<PathBuf>,
}

impl DuplicateFinder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Skips top-level directories with this name, such as the backup folder.
    pub fn skip_dir_name(mut self, name: impl Into<String>) -> Self {
        self.skipped_dir_names.push(name.into());
        self
    }

    /// Files never reported, such as foldersort's own logs.
    pub fn with_protected_paths(mut self, paths: impl IntoIterator<Item = PathBuf>) -> Self {
        self.protected
            .extend(paths.into_iter().map(|p| normalize_path(&p)));
        self
    }

    pub fn find_duplicates(&self, folder: &Path) -> OrganizeResult<ScanReport> {
        self.find_duplicates_with_progress(folder, |_, _| {})
    }

    /// Scans `folder` recursively and groups files by content.
    ///
    /// `progress` is called after each hashed file with `(hashed, to_hash)`.
    /// Symlinks are not followed.
    ///
    /// # Errors
    ///
    /// Returns `OrganizeError::InvalidBasePath` if `folder` is not a directory.
    /// Unreadable entries below it end up in [`ScanReport::errors`].
    pub fn find_duplicates_with_progress<P>(
        &self,
        folder: &Path,
        mut progress: P,
    ) -> OrganizeResult<ScanReport>
    where
        P: FnMut(usize, usize),
    {
        if !folder.is_dir() {
            return Err(OrganizeError::not_a_directory(folder));
        }

        let mut report = ScanReport::default();
        let mut by_size: HashMap<u64, Vec<(PathBuf, SystemTime)>> = HashMap::new();

        let walker = WalkDir::new(folder)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| !self.is_skipped_dir(entry));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().unwrap_or(folder).to_path_buf();
                    warn!(path = %path.display(), error = %e, "could not read entry");
                    report.errors.push((path, e.to_string()));
                    continue;
                }
            };
            if !entry.file_type().is_file() || self.is_protected(entry.path()) {
                continue;
            }

            match entry.metadata() {
                Ok(meta) => {
                    report.scanned_files += 1;
                    let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
                    by_size
                        .entry(meta.len())
                        .or_default()
                        .push((entry.into_path(), modified));
                }
                Err(e) => report
                    .errors
                    .push((entry.path().to_path_buf(), e.to_string())),
            }
        }

        let candidates: Vec<(u64, Vec<(PathBuf, SystemTime)>)> = by_size
            .into_iter()
            .filter(|(_, files)| files.len() > 1)
            .collect();
        let to_hash: usize = candidates.iter().map(|(_, files)| files.len()).sum();
        debug!(
            scanned = report.scanned_files,
            to_hash, "size buckets built"
        );

        let mut hashed = 0;
        for (size, files) in candidates {
            let mut by_digest: HashMap<String, Vec<(PathBuf, SystemTime)>> = HashMap::new();
            for (path, modified) in files {
                match hash_file(&path) {
                    Ok(digest) => by_digest.entry(digest).or_default().push((path, modified)),
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "could not hash file");
                        report.errors.push((path, e.to_string()));
                    }
                }
                hashed += 1;
                progress(hashed, to_hash);
            }

            for (digest, mut members) in by_digest {
                if members.len() < 2 {
                    continue;
                }
                members.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
                report.groups.push(DuplicateGroup {
                    digest,
                    size,
                    files: members.into_iter().map(|(path, _)| path).collect(),
                });
            }
        }

        // Group order follows the (mtime, path) order of each original.
        let mut keyed: Vec<(Option<SystemTime>, DuplicateGroup)> = report
            .groups
            .drain(..)
            .map(|group| (group.original().map(modified_time), group))
            .collect();
        keyed.sort_by(|a, b| {
            a.0.cmp(&b.0)
                .then_with(|| a.1.original().cmp(&b.1.original()))
        });
        report.groups = keyed.into_iter().map(|(_, group)| group).collect();

        info!(
            folder = %folder.display(),
            groups = report.groups.len(),
            duplicates = report.duplicate_count(),
            "duplicate scan finished"
        );
        Ok(report)
    }

    fn is_skipped_dir(&self, entry: &walkdir::DirEntry) -> bool {
        entry.depth() == 1
            && entry.file_type().is_dir()
            && self
                .skipped_dir_names
                .iter()
                .any(|name| entry.file_name() == name.as_str())
    }

    fn is_protected(&self, path: &Path) -> bool {
        !self.protected.is_empty() && self.protected.contains(&normalize_path(path))
    }
}

fn modified_time(path: &Path) -> SystemTime {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

/// Hex-encoded SHA-256 of a file's content, read in 64 KiB chunks.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Permanently deletes every member of each group except the first.
///
/// Callers are expected to have confirmed with the user. A file that cannot
/// be removed is reported and the rest are still processed.
pub fn delete_duplicates(groups: &[DuplicateGroup]) -> DeletionReport {
    let mut report = DeletionReport::default();
    for group in groups {
        for path in group.redundant() {
            match fs::remove_file(path) {
                Ok(()) => {
                    debug!(path = %path.display(), "deleted duplicate");
                    report.deleted.push(path.clone());
                }
                Err(e) => {
                    let err = OrganizeError::FileDeleteFailure {
                        path: path.clone(),
                        source: e,
                    };
                    warn!(error = %err, "could not delete duplicate");
                    report.errors.push((path.clone(), err.to_string()));
                }
            }
        }
    }
    info!(
        deleted = report.deleted.len(),
        errors = report.errors.len(),
        "duplicates deleted"
    );
    report
}

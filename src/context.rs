//! The application context.
//!
//! [`AppContext`] is built once from an [`AppConfig`] and passed to whatever
//! needs it, usually as `Arc<AppContext>`. It owns the undo log store, the
//! activity log and the folder locks, so there is exactly one of each per
//! process without any global state.

use crate::activity::{Activity, ActivityLog};
use crate::backup::{self, BackupReport};
use crate::config::{AppConfig, CompiledFilters};
use crate::duplicates::{self, DeletionReport, DuplicateFinder, DuplicateGroup, ScanReport};
use crate::error::{ConfigError, OrganizeError, OrganizeResult};
use crate::file_organizer::{FileOrganizer, OrganizeReport, PlannedMove, normalize_path};
use crate::lock::FolderLocks;
use crate::undo::{UndoLogStore, UndoManager, UndoOutcome};
use std::path::{Path, PathBuf};
use tracing::{error, warn};

/// Shared state and entry points for every foldersort operation.
#[derive(Debug)]
pub struct AppContext {
    organizer: FileOrganizer,
    finder: DuplicateFinder,
    backup_folder_name: String,
    undo_store: UndoLogStore,
    activity: ActivityLog,
    locks: FolderLocks,
}

impl AppContext {
    /// Builds the context with the storage locations from `config`.
    pub fn new(config: &AppConfig) -> Result<Self, ConfigError> {
        Self::with_storage(
            config,
            config.storage.undo_log_path(),
            Some(config.storage.activity_log_path()),
        )
    }

    /// Builds the context with explicit storage locations. An `activity_log`
    /// of `None` disables the activity file.
    pub fn with_storage(
        config: &AppConfig,
        undo_log: PathBuf,
        activity_log: Option<PathBuf>,
    ) -> Result<Self, ConfigError> {
        let filters = CompiledFilters::new(&config.filters)?;

        // foldersort's own files are never organized or reported as duplicates,
        // even when the state directory sits inside the organized folder.
        let mut own_files = vec![undo_log.clone(), tmp_sibling(&undo_log)];
        own_files.extend(activity_log.iter().cloned());

        let organizer =
            FileOrganizer::new(config.resolver(), filters).with_protected_paths(own_files.clone());
        let finder = DuplicateFinder::new()
            .skip_dir_name(config.backup.folder_name.clone())
            .with_protected_paths(own_files);

        Ok(Self {
            organizer,
            finder,
            backup_folder_name: config.backup.folder_name.clone(),
            undo_store: UndoLogStore::new(undo_log),
            activity: activity_log.map_or_else(ActivityLog::disabled, ActivityLog::new),
            locks: FolderLocks::new(),
        })
    }

    pub fn organizer(&self) -> &FileOrganizer {
        &self.organizer
    }

    pub fn undo_store(&self) -> &UndoLogStore {
        &self.undo_store
    }

    pub fn activity(&self) -> &ActivityLog {
        &self.activity
    }

    pub fn locks(&self) -> &FolderLocks {
        &self.locks
    }

    pub fn backup_folder_name(&self) -> &str {
        &self.backup_folder_name
    }

    /// Organizes `folder` and replaces the undo log with this pass's moves.
    ///
    /// Holds the folder lock for the whole pass. Each move is appended to the
    /// undo log as soon as it completes.
    pub fn organize(&self, folder: &Path) -> OrganizeResult<OrganizeReport> {
        self.organize_as(folder, Activity::Organize)
    }

    /// Organize as run by the scheduler: same pass, logged as a tick.
    pub(crate) fn organize_as(
        &self,
        folder: &Path,
        activity: Activity,
    ) -> OrganizeResult<OrganizeReport> {
        let result = self.organize_locked(folder);
        match &result {
            Ok(report) => self.activity.record(activity, report.summary()),
            Err(e) => {
                error!(folder = %folder.display(), error = %e, "organize failed");
                self.activity.record(activity, format!("failed: {}", e));
            }
        }
        result
    }

    fn organize_locked(&self, folder: &Path) -> OrganizeResult<OrganizeReport> {
        if !folder.is_dir() {
            return Err(OrganizeError::not_a_directory(folder));
        }
        let folder = normalize_path(folder);
        let _guard = self.locks.lock(&folder);

        let mut writer = match self.undo_store.begin(&folder) {
            Ok(writer) => Some(writer),
            Err(e) => {
                warn!(error = %e, "undo log unavailable, moves will not be undoable");
                None
            }
        };

        self.organizer
            .organize(&folder, |record| match writer.as_mut() {
                Some(writer) => writer.append(record),
                None => Err(OrganizeError::HistoryWriteFailed {
                    path: self.undo_store.path().to_path_buf(),
                    source: std::io::Error::other("undo log could not be started"),
                }),
            })
    }

    /// What [`organize`](Self::organize) would do, without moving anything.
    pub fn plan(&self, folder: &Path) -> OrganizeResult<Vec<PlannedMove>> {
        self.organizer.plan(folder)
    }

    /// Reverses the most recent organize pass.
    pub fn undo_last(&self) -> OrganizeResult<UndoOutcome> {
        let result = UndoManager::undo_last(&self.undo_store, &self.locks);
        let outcome = match &result {
            Ok(UndoOutcome::NothingToUndo) => "nothing to undo".to_string(),
            Ok(UndoOutcome::Completed(report)) => format!(
                "folder={} restored={} skipped={} failed={}",
                report.base_path.display(),
                report.restored_files,
                report.skipped_files.len(),
                report.failed_restores.len()
            ),
            Err(e) => format!("failed: {}", e),
        };
        self.activity.record(Activity::Undo, outcome);
        result
    }

    pub fn find_duplicates(&self, folder: &Path) -> OrganizeResult<ScanReport> {
        self.find_duplicates_with_progress(folder, |_, _| {})
    }

    /// Duplicate scan with a `(hashed, to_hash)` progress callback.
    ///
    /// Holds the folder lock, so a scan never overlaps an organize pass.
    pub fn find_duplicates_with_progress<P>(
        &self,
        folder: &Path,
        progress: P,
    ) -> OrganizeResult<ScanReport>
    where
        P: FnMut(usize, usize),
    {
        let result = {
            let _guard = self.locks.lock(folder);
            self.finder.find_duplicates_with_progress(folder, progress)
        };
        let outcome = match &result {
            Ok(report) => format!(
                "folder={} scanned={} groups={} duplicates={}",
                folder.display(),
                report.scanned_files,
                report.groups.len(),
                report.duplicate_count()
            ),
            Err(e) => format!("failed: {}", e),
        };
        self.activity.record(Activity::FindDuplicates, outcome);
        result
    }

    /// Deletes all but the first member of each group found in `folder`.
    /// Permanent. Holds the folder lock while deleting.
    pub fn delete_duplicates(&self, folder: &Path, groups: &[DuplicateGroup]) -> DeletionReport {
        let report = {
            let _guard = self.locks.lock(folder);
            duplicates::delete_duplicates(groups)
        };
        self.activity.record(
            Activity::DeleteDuplicates,
            format!(
                "deleted={} errors={}",
                report.deleted.len(),
                report.errors.len()
            ),
        );
        report
    }

    /// Copies `folder` into a new snapshot inside its backup folder.
    pub fn backup(&self, folder: &Path) -> OrganizeResult<BackupReport> {
        let result = {
            let _guard = self.locks.lock(folder);
            backup::create_backup(folder, &self.backup_folder_name)
        };
        let outcome = match &result {
            Ok(report) => format!(
                "snapshot={} files={} errors={}",
                report.snapshot_dir.display(),
                report.copied_files,
                report.errors.len()
            ),
            Err(e) => format!("failed: {}", e),
        };
        self.activity.record(Activity::Backup, outcome);
        result
    }
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

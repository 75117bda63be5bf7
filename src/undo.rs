//! Undo log persistence and the undo operation.
//!
//! The undo log holds the moves of the most recent organize pass. It is a
//! JSON Lines file: a session header followed by one line per completed move,
//! appended and flushed as each move finishes, so an interrupted pass still
//! leaves a log that matches exactly what was moved.
//!
//! Undo replays the log last-move-first and then clears it, so the same moves
//! cannot be reversed twice.

use crate::error::{OrganizeError, OrganizeResult};
use crate::file_organizer::{MoveRecord, unique_destination};
use crate::lock::FolderLocks;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// The persisted moves of one organize pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoLog {
    /// The folder that was organized.
    pub base_path: PathBuf,
    pub started_at: DateTime<Utc>,
    /// Moves in the order they happened.
    pub records: Vec<MoveRecord>,
}

impl UndoLog {
    pub fn new(base_path: PathBuf) -> Self {
        Self {
            base_path,
            started_at: Utc::now(),
            records: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "entry", rename_all = "snake_case")]
enum LogLine {
    Session {
        base_path: PathBuf,
        started_at: DateTime<Utc>,
    },
    Move(MoveRecord),
}

/// File-backed store for the most recent [`UndoLog`].
///
/// One store is shared by the whole process. Its internal lock serializes
/// writers; callers that also hold a folder lock must take the folder lock
/// first.
#[derive(Debug)]
pub struct UndoLogStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl UndoLogStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Starts a new log for `base_path`, replacing whatever was stored.
    ///
    /// The returned writer holds the store lock until it is dropped.
    pub fn begin(&self, base_path: &Path) -> OrganizeResult<UndoLogWriter<'_>> {
        let guard = self.guard();
        self.ensure_parent()?;

        let file = File::create(&self.path).map_err(|e| self.write_error(e))?;
        let mut writer = UndoLogWriter {
            _guard: guard,
            path: self.path.clone(),
            out: BufWriter::new(file),
        };
        writer.write_line(&LogLine::Session {
            base_path: base_path.to_path_buf(),
            started_at: Utc::now(),
        })?;
        Ok(writer)
    }

    /// Replaces the stored log with `log`.
    pub fn save(&self, log: &UndoLog) -> OrganizeResult<()> {
        let _guard = self.guard();
        self.write_log(log)
    }

    /// Returns the most recently saved log, or `None` if there is none.
    ///
    /// # Errors
    ///
    /// Returns `HistoryReadFailed` if the file cannot be read and
    /// `InvalidHistoryFormat` if it is not an undo log.
    pub fn load(&self) -> OrganizeResult<Option<UndoLog>> {
        let _guard = self.guard();
        self.read_log()
    }

    /// The stored move records, or an empty list when nothing is stored.
    pub fn load_records(&self) -> OrganizeResult<Vec<MoveRecord>> {
        Ok(self.load()?.map(|log| log.records).unwrap_or_default())
    }

    /// Deletes the stored log.
    pub fn clear(&self) -> OrganizeResult<()> {
        let _guard = self.guard();
        self.remove_log()
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ensure_parent(&self) -> OrganizeResult<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| self.write_error(e))?;
        }
        Ok(())
    }

    fn write_error(&self, source: std::io::Error) -> OrganizeError {
        OrganizeError::HistoryWriteFailed {
            path: self.path.clone(),
            source,
        }
    }

    fn read_log(&self) -> OrganizeResult<Option<UndoLog>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(OrganizeError::HistoryReadFailed {
                    path: self.path.clone(),
                    source: e,
                });
            }
        };

        let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
        let Some((header, moves)) = lines.split_first() else {
            return Ok(None);
        };

        let (base_path, started_at) = match serde_json::from_str::<LogLine>(header) {
            Ok(LogLine::Session {
                base_path,
                started_at,
            }) => (base_path, started_at),
            Ok(LogLine::Move(_)) => {
                return Err(OrganizeError::InvalidHistoryFormat {
                    reason: "log does not start with a session header".to_string(),
                });
            }
            Err(e) => {
                return Err(OrganizeError::InvalidHistoryFormat {
                    reason: format!("bad session header: {}", e),
                });
            }
        };

        let mut records = Vec::with_capacity(moves.len());
        for (i, line) in moves.iter().enumerate() {
            match serde_json::from_str::<LogLine>(line) {
                Ok(LogLine::Move(record)) => records.push(record),
                Ok(LogLine::Session { .. }) => {
                    return Err(OrganizeError::InvalidHistoryFormat {
                        reason: format!("unexpected session header on line {}", i + 2),
                    });
                }
                // A pass killed mid-write can leave a torn last line.
                Err(e) if i + 1 == moves.len() && !content.ends_with('\n') => {
                    warn!(error = %e, "ignoring truncated last line of undo log");
                }
                Err(e) => {
                    return Err(OrganizeError::InvalidHistoryFormat {
                        reason: format!("line {}: {}", i + 2, e),
                    });
                }
            }
        }

        Ok(Some(UndoLog {
            base_path,
            started_at,
            records,
        }))
    }

    fn write_log(&self, log: &UndoLog) -> OrganizeResult<()> {
        self.ensure_parent()?;

        let mut tmp_name = self.path.as_os_str().to_os_string();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        let mut body = String::new();
        let header = LogLine::Session {
            base_path: log.base_path.clone(),
            started_at: log.started_at,
        };
        for line in std::iter::once(header).chain(log.records.iter().cloned().map(LogLine::Move)) {
            body.push_str(&to_json_line(&line)?);
        }

        fs::write(&tmp_path, body).map_err(|e| self.write_error(e))?;
        fs::rename(&tmp_path, &self.path).map_err(|e| self.write_error(e))
    }

    fn remove_log(&self) -> OrganizeResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.write_error(e)),
        }
    }
}

fn to_json_line(line: &LogLine) -> OrganizeResult<String> {
    let mut json = serde_json::to_string(line).map_err(|e| OrganizeError::InvalidHistoryFormat {
        reason: format!("JSON serialization failed: {}", e),
    })?;
    json.push('\n');
    Ok(json)
}

/// Appends move records to a freshly started undo log.
#[derive(Debug)]
pub struct UndoLogWriter<'a> {
    _guard: MutexGuard<'a, ()>,
    path: PathBuf,
    out: BufWriter<File>,
}

impl UndoLogWriter<'_> {
    /// Appends one record and flushes it to disk.
    pub fn append(&mut self, record: &MoveRecord) -> OrganizeResult<()> {
        self.write_line(&LogLine::Move(record.clone()))
    }

    fn write_line(&mut self, line: &LogLine) -> OrganizeResult<()> {
        let json = to_json_line(line)?;
        self.out
            .write_all(json.as_bytes())
            .and_then(|()| self.out.flush())
            .map_err(|e| OrganizeError::HistoryWriteFailed {
                path: self.path.clone(),
                source: e,
            })
    }
}

/// Result of an undo pass.
#[derive(Debug)]
pub struct UndoReport {
    /// The folder whose organize pass was reversed.
    pub base_path: PathBuf,
    /// Number of files successfully restored.
    pub restored_files: usize,
    /// Files that could not be restored; these stay in the undo log.
    pub failed_restores: Vec<(PathBuf, String)>,
    /// Records that no longer apply (file gone, original folder gone).
    pub skipped_files: Vec<(PathBuf, String)>,
}

impl UndoReport {
    fn new(base_path: PathBuf) -> Self {
        Self {
            base_path,
            restored_files: 0,
            failed_restores: Vec::new(),
            skipped_files: Vec::new(),
        }
    }

    /// Returns the total number of records processed.
    pub fn total_processed(&self) -> usize {
        self.restored_files + self.failed_restores.len() + self.skipped_files.len()
    }

    /// Returns true if every record was restored.
    pub fn is_complete_success(&self) -> bool {
        self.failed_restores.is_empty() && self.skipped_files.is_empty()
    }
}

/// What [`UndoManager::undo_last`] did.
#[derive(Debug)]
pub enum UndoOutcome {
    /// The store was empty.
    NothingToUndo,
    Completed(UndoReport),
}

enum RestoreIssue {
    Skipped(String),
    Failed(String),
}

/// Reverses the most recent organize pass.
pub struct UndoManager;

impl UndoManager {
    /// Undoes the moves recorded in `store`, last move first.
    ///
    /// The organized folder is locked for the duration so a scheduled pass
    /// cannot run in between.
    ///
    /// # Edge Cases Handled
    ///
    /// * **File no longer at its destination**: skipped
    /// * **Original folder deleted**: skipped
    /// * **Another file now at the original path**: that file is renamed to
    ///   `<name>.bak.<timestamp>` first
    /// * **Permission denied and other IO errors**: recorded as failures and
    ///   kept in the undo log for a later retry
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use foldersort::lock::FolderLocks;
    /// use foldersort::undo::{UndoLogStore, UndoManager, UndoOutcome};
    ///
    /// let store = UndoLogStore::new("/tmp/foldersort/undo_log.jsonl");
    /// match UndoManager::undo_last(&store, &FolderLocks::new()) {
    ///     Ok(UndoOutcome::Completed(report)) => println!("Restored {} files", report.restored_files),
    ///     Ok(UndoOutcome::NothingToUndo) => println!("Nothing to undo"),
    ///     Err(e) => eprintln!("Undo failed: {}", e),
    /// }
    /// ```
    pub fn undo_last(store: &UndoLogStore, locks: &FolderLocks) -> OrganizeResult<UndoOutcome> {
        loop {
            let Some(peeked) = store.load()? else {
                return Ok(UndoOutcome::NothingToUndo);
            };

            let _folder_guard = locks.lock(&peeked.base_path);
            let _store_guard = store.guard();

            let Some(log) = store.read_log()? else {
                return Ok(UndoOutcome::NothingToUndo);
            };
            if log.base_path != peeked.base_path || log.started_at != peeked.started_at {
                // A newer pass replaced the log while we waited for the lock.
                debug!("undo log changed while waiting, retrying");
                continue;
            }

            if log.records.is_empty() {
                store.remove_log()?;
                return Ok(UndoOutcome::NothingToUndo);
            }

            return Ok(UndoOutcome::Completed(Self::reverse(store, log)));
        }
    }

    // Caller holds the store lock.
    fn reverse(store: &UndoLogStore, log: UndoLog) -> UndoReport {
        info!(
            folder = %log.base_path.display(),
            records = log.records.len(),
            "undoing last organize"
        );

        let mut report = UndoReport::new(log.base_path.clone());
        let mut still_pending = Vec::new();

        for record in log.records.iter().rev() {
            match Self::restore_file(record) {
                Ok(()) => report.restored_files += 1,
                Err(RestoreIssue::Skipped(reason)) => {
                    debug!(file = %record.destination_path.display(), %reason, "skipped");
                    report
                        .skipped_files
                        .push((record.destination_path.clone(), reason));
                }
                Err(RestoreIssue::Failed(reason)) => {
                    warn!(file = %record.destination_path.display(), %reason, "restore failed");
                    report
                        .failed_restores
                        .push((record.destination_path.clone(), reason));
                    still_pending.push(record.clone());
                }
            }
        }

        let result = if still_pending.is_empty() {
            store.remove_log()
        } else {
            still_pending.reverse();
            store.write_log(&UndoLog {
                records: still_pending,
                ..log
            })
        };
        if let Err(e) = result {
            warn!(error = %e, "could not update undo log after undo");
        }

        report
    }

    /// Moves one file back to where it came from.
    fn restore_file(record: &MoveRecord) -> Result<(), RestoreIssue> {
        if fs::symlink_metadata(&record.destination_path).is_err() {
            return Err(RestoreIssue::Skipped(
                "File not found at expected location".to_string(),
            ));
        }

        let parent_exists = record
            .source_path
            .parent()
            .is_none_or(|parent| parent.as_os_str().is_empty() || parent.is_dir());
        if !parent_exists {
            return Err(RestoreIssue::Skipped(
                "Original folder no longer exists".to_string(),
            ));
        }

        if fs::symlink_metadata(&record.source_path).is_ok() {
            let backup_path = Self::generate_backup_path(&record.source_path);
            fs::rename(&record.source_path, &backup_path).map_err(|e| {
                RestoreIssue::Failed(format!("Could not backup conflicting file: {}", e))
            })?;
            info!(
                file = %record.source_path.display(),
                backup = %backup_path.display(),
                "moved conflicting file aside"
            );
        }

        fs::rename(&record.destination_path, &record.source_path)
            .map_err(|e| RestoreIssue::Failed(format!("Failed to restore file: {}", e)))
    }

    /// Generates a free backup path for a file by appending a timestamp.
    ///
    /// Example: `file.txt` becomes `file.txt.bak.20251109-143052`
    fn generate_backup_path(original_path: &Path) -> PathBuf {
        let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
        let filename = original_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        let folder = original_path.parent().unwrap_or_else(|| Path::new(""));

        unique_destination(
            folder,
            std::ffi::OsStr::new(&format!("{}.bak.{}", filename, timestamp)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_organizer::FileOrganizer;
    use std::fs::{self, OpenOptions};
    use tempfile::TempDir;

    fn append_torn_line(path: &Path) {
        let mut file = OpenOptions::new()
            .append(true)
            .open(path)
            .expect("Failed to open undo log");
        file.write_all(br#"{"entry":"move","source_pa"#)
            .expect("Failed to append");
    }

    fn store_in(dir: &TempDir) -> UndoLogStore {
        UndoLogStore::new(dir.path().join("state").join("undo_log.jsonl"))
    }

    fn moved(base: &Path, name: &str, category: &str) -> MoveRecord {
        let file_path = base.join(name);
        fs::write(&file_path, name).expect("Failed to write test file");
        FileOrganizer::move_file(&file_path, &base.join(category)).expect("Failed to move file")
    }

    #[test]
    fn test_load_empty_store() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = store_in(&temp_dir);

        assert!(store.load().unwrap().is_none());
        assert!(store.load_records().unwrap().is_empty());
    }

    #[test]
    fn test_writer_persists_each_record() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = temp_dir.path();
        let store = store_in(&temp_dir);

        let first = moved(base, "a.jpg", "Images");
        let second = moved(base, "b.pdf", "Documents");
        {
            let mut writer = store.begin(base).unwrap();
            writer.append(&first).unwrap();
            writer.append(&second).unwrap();
        }

        let log = store.load().unwrap().expect("log should exist");
        assert_eq!(log.base_path, base);
        assert_eq!(log.records, vec![first, second]);
    }

    #[test]
    fn test_begin_replaces_previous_log() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = temp_dir.path();
        let store = store_in(&temp_dir);

        let record = moved(base, "a.jpg", "Images");
        store.begin(base).unwrap().append(&record).unwrap();
        drop(store.begin(base).unwrap());

        assert!(store.load_records().unwrap().is_empty());
    }

    #[test]
    fn test_save_and_clear() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = temp_dir.path();
        let store = store_in(&temp_dir);

        let mut log = UndoLog::new(base.to_path_buf());
        log.records.push(moved(base, "a.jpg", "Images"));
        store.save(&log).unwrap();
        assert_eq!(store.load().unwrap(), Some(log));

        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
        // Clearing twice is fine.
        store.clear().unwrap();
    }

    #[test]
    fn test_torn_last_line_is_ignored() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = temp_dir.path();
        let store = store_in(&temp_dir);

        let record = moved(base, "a.jpg", "Images");
        store.begin(base).unwrap().append(&record).unwrap();
        append_torn_line(store.path());

        assert_eq!(store.load_records().unwrap(), vec![record]);
    }

    #[test]
    fn test_garbage_log_is_an_error() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = store_in(&temp_dir);
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), "not json\n").unwrap();

        assert!(matches!(
            store.load(),
            Err(OrganizeError::InvalidHistoryFormat { .. })
        ));
    }

    #[test]
    fn test_undo_empty_store_is_noop() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = store_in(&temp_dir);

        let outcome = UndoManager::undo_last(&store, &FolderLocks::new()).unwrap();
        assert!(matches!(outcome, UndoOutcome::NothingToUndo));
    }

    #[test]
    fn test_undo_multiple_files_in_reverse() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = temp_dir.path();
        let store = store_in(&temp_dir);

        let mut log = UndoLog::new(base.to_path_buf());
        log.records.push(moved(base, "image.png", "Images"));
        log.records.push(moved(base, "document.pdf", "Documents"));
        store.save(&log).unwrap();

        let UndoOutcome::Completed(report) =
            UndoManager::undo_last(&store, &FolderLocks::new()).unwrap()
        else {
            panic!("expected an undo report");
        };

        assert_eq!(report.restored_files, 2);
        assert!(report.is_complete_success());
        assert!(base.join("image.png").exists());
        assert!(base.join("document.pdf").exists());
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_undo_reverses_chained_moves() {
        // The same file moved twice within one log: only reverse order gets
        // it back to the very first location.
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = temp_dir.path();
        let store = store_in(&temp_dir);

        let first = moved(base, "a.txt", "Stage1");
        let second = FileOrganizer::move_file(&first.destination_path, &base.join("Stage2"))
            .expect("Failed to move file");

        let mut log = UndoLog::new(base.to_path_buf());
        log.records = vec![first, second];
        store.save(&log).unwrap();

        UndoManager::undo_last(&store, &FolderLocks::new()).unwrap();
        assert!(base.join("a.txt").exists());
        assert!(!base.join("Stage1").join("a.txt").exists());
    }

    #[test]
    fn test_undo_with_file_name_conflict() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = temp_dir.path();
        let store = store_in(&temp_dir);

        let mut log = UndoLog::new(base.to_path_buf());
        log.records.push(moved(base, "test.txt", "Documents"));
        store.save(&log).unwrap();

        fs::write(base.join("test.txt"), "new content").expect("Failed to create conflict");

        let UndoOutcome::Completed(report) =
            UndoManager::undo_last(&store, &FolderLocks::new()).unwrap()
        else {
            panic!("expected an undo report");
        };
        assert_eq!(report.restored_files, 1);
        assert!(report.failed_restores.is_empty());
        assert_eq!(fs::read_to_string(base.join("test.txt")).unwrap(), "test.txt");

        let backups: Vec<_> = fs::read_dir(base)
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().contains(".bak."))
            .collect();
        assert_eq!(backups.len(), 1);
        assert_eq!(fs::read_to_string(backups[0].path()).unwrap(), "new content");
    }

    #[test]
    fn test_undo_skips_missing_files_and_clears_log() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = temp_dir.path();
        let store = store_in(&temp_dir);

        let mut log = UndoLog::new(base.to_path_buf());
        log.records.push(MoveRecord {
            source_path: base.join("nonexistent.txt"),
            destination_path: base.join("Documents").join("nonexistent.txt"),
            timestamp: Utc::now(),
        });
        log.records.push(moved(base, "kept.jpg", "Images"));
        store.save(&log).unwrap();

        let UndoOutcome::Completed(report) =
            UndoManager::undo_last(&store, &FolderLocks::new()).unwrap()
        else {
            panic!("expected an undo report");
        };
        assert_eq!(report.restored_files, 1);
        assert_eq!(report.skipped_files.len(), 1);
        assert_eq!(report.total_processed(), 2);
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_undo_skips_when_original_folder_is_gone() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = temp_dir.path();
        let store = store_in(&temp_dir);

        let sub = base.join("inbox");
        fs::create_dir(&sub).unwrap();
        fs::write(sub.join("a.jpg"), "a").unwrap();
        let record = FileOrganizer::move_file(&sub.join("a.jpg"), &base.join("Images"))
            .expect("Failed to move file");
        fs::remove_dir_all(&sub).unwrap();

        let mut log = UndoLog::new(sub.clone());
        log.records.push(record.clone());
        store.save(&log).unwrap();

        let UndoOutcome::Completed(report) =
            UndoManager::undo_last(&store, &FolderLocks::new()).unwrap()
        else {
            panic!("expected an undo report");
        };
        assert_eq!(report.skipped_files.len(), 1);
        assert!(record.destination_path.exists());
    }

    #[test]
    fn test_undo_cannot_be_replayed() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = temp_dir.path();
        let store = store_in(&temp_dir);

        let mut log = UndoLog::new(base.to_path_buf());
        log.records.push(moved(base, "a.jpg", "Images"));
        store.save(&log).unwrap();

        let locks = FolderLocks::new();
        assert!(matches!(
            UndoManager::undo_last(&store, &locks).unwrap(),
            UndoOutcome::Completed(_)
        ));
        assert!(matches!(
            UndoManager::undo_last(&store, &locks).unwrap(),
            UndoOutcome::NothingToUndo
        ));
    }
}

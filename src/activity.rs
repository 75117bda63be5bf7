//! Append-only activity log.
//!
//! One line per event: `<RFC 3339 timestamp>\t<operation>\t<outcome>`. The log
//! exists for people reading it after the fact; nothing in foldersort reads it
//! back. Write failures are logged and otherwise ignored.

use chrono::{SecondsFormat, Utc};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};

/// Operations that leave a trace in the activity log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    Organize,
    Undo,
    FindDuplicates,
    DeleteDuplicates,
    ScheduleStart,
    ScheduleTick,
    ScheduleStop,
    Backup,
}

impl Activity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Activity::Organize => "organize",
            Activity::Undo => "undo",
            Activity::FindDuplicates => "find-duplicates",
            Activity::DeleteDuplicates => "delete-duplicates",
            Activity::ScheduleStart => "schedule-start",
            Activity::ScheduleTick => "schedule-tick",
            Activity::ScheduleStop => "schedule-stop",
            Activity::Backup => "backup",
        }
    }
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Writer for the activity log file. A log without a path only emits
/// `tracing` events.
#[derive(Debug)]
pub struct ActivityLog {
    path: Option<PathBuf>,
    write_lock: Mutex<()>,
}

impl ActivityLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            write_lock: Mutex::new(()),
        }
    }

    pub fn disabled() -> Self {
        Self {
            path: None,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Appends one event.
    pub fn record(&self, activity: Activity, outcome: impl AsRef<str>) {
        // Tabs and newlines would break the one-line-per-event layout.
        let outcome = outcome.as_ref().replace(['\t', '\n', '\r'], " ");
        info!(target: "foldersort::activity", operation = %activity, %outcome);

        let Some(path) = &self.path else {
            return;
        };

        let line = format!(
            "{}\t{}\t{}\n",
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            activity,
            outcome
        );

        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Err(e) = append_line(path, &line) {
            warn!(path = %path.display(), error = %e, "could not write activity log");
        }
    }
}

fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(line.as_bytes())
}

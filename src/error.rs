//! Error types shared across foldersort.
//!
//! Configuration problems never abort anything: the loader logs them and falls
//! back to defaults. Per-file organize/undo/delete failures are turned into
//! `(path, reason)` entries by the batch operations, so only the variants that
//! are raised before a batch starts ever reach the caller as `Err`.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file not found at the specified path.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Invalid TOML syntax or structure.
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// Invalid glob pattern provided.
    #[error("Invalid glob pattern '{0}': expected *.ext or dir/**")]
    InvalidGlobPattern(String),

    /// Invalid regex pattern provided with the actual error reason.
    #[error("Invalid regex pattern '{pattern}': {reason}")]
    InvalidRegexPattern {
        /// The regex pattern that failed to compile.
        pattern: String,
        /// The reason why the pattern is invalid.
        reason: String,
    },

    /// A category name that cannot be used as a folder name.
    #[error("Invalid category '{name}': {reason}")]
    InvalidCategory { name: String, reason: String },

    /// IO error while reading configuration.
    #[error("IO error reading configuration: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur during file organization, undo, backup and
/// duplicate deletion.
#[derive(Error, Debug)]
pub enum OrganizeError {
    /// Failed to create a category directory.
    #[error("Failed to create directory {}: {source}", path.display())]
    DirectoryCreationFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to move a file to its category directory.
    #[error("Failed to move {} to {}: {source}", from.display(), to.display())]
    FileMoveFailure {
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },

    /// Failed to copy a file into a backup.
    #[error("Failed to copy {} to {}: {source}", from.display(), to.display())]
    FileCopyFailure {
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },

    /// Failed to delete a duplicate file.
    #[error("Failed to delete {}: {source}", path.display())]
    FileDeleteFailure {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The base directory path is invalid or doesn't exist.
    #[error("Invalid base path {}: {source}", path.display())]
    InvalidBasePath {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to write the undo log.
    #[error("Failed to write undo log {}: {source}", path.display())]
    HistoryWriteFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to read the undo log.
    #[error("Failed to read undo log {}: {source}", path.display())]
    HistoryReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The undo log has invalid format.
    #[error("Invalid undo log format: {reason}")]
    InvalidHistoryFormat { reason: String },
}

impl OrganizeError {
    /// Builds an `InvalidBasePath` error for a folder that does not exist or
    /// is not a directory.
    pub(crate) fn not_a_directory(path: &std::path::Path) -> Self {
        Self::InvalidBasePath {
            path: path.to_path_buf(),
            source: std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "base path does not exist or is not a directory",
            ),
        }
    }
}

/// Result type for file organization operations.
pub type OrganizeResult<T> = Result<T, OrganizeError>;

/// Errors raised when arming the scheduler.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    /// The interval must be strictly positive.
    #[error("Invalid schedule interval {0:?}: must be greater than zero")]
    InvalidInterval(Duration),

    /// The background thread could not be spawned.
    #[error("Failed to start scheduler thread: {0}")]
    SpawnFailed(String),
}

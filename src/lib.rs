//! foldersort - sort a folder's files into category subfolders
//!
//! The library resolves file extensions to categories, moves files without
//! ever overwriting, keeps an undo log of the last organize pass, finds
//! duplicate files by content hash, takes backup snapshots and re-runs
//! organize on a schedule. Every operation goes through an explicit
//! [`AppContext`] built from a validated [`AppConfig`].

pub mod activity;
pub mod backup;
pub mod cli;
pub mod config;
pub mod context;
pub mod duplicates;
pub mod error;
pub mod file_category;
pub mod file_organizer;
pub mod lock;
pub mod logging;
pub mod output;
pub mod scheduler;
pub mod undo;

pub use config::{AppConfig, CompiledFilters, FilterRules};
pub use context::AppContext;
pub use duplicates::{DeletionReport, DuplicateFinder, DuplicateGroup, ScanReport};
pub use error::{ConfigError, OrganizeError, OrganizeResult, ScheduleError};
pub use file_category::{CategoryResolver, CategoryTable, Resolved};
pub use file_organizer::{FileOrganizer, MoveRecord, OrganizeReport, PlannedMove};
pub use scheduler::{ScheduleState, Scheduler};
pub use undo::{UndoLogStore, UndoManager, UndoOutcome, UndoReport};

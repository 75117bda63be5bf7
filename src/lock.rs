//! Per-folder mutual exclusion.
//!
//! A scheduled tick and a user-triggered organize of the same folder must
//! never interleave their file moves. Every operation that moves files inside
//! a folder holds that folder's guard for its whole duration; operations on
//! different folders proceed independently.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Condvar, Mutex, MutexGuard};
use tracing::trace;

/// Set of folders that currently have an operation in flight.
#[derive(Debug, Default)]
pub struct FolderLocks {
    busy: Mutex<HashSet<PathBuf>>,
    released: Condvar,
}

impl FolderLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until no other operation holds `folder`, then claims it.
    ///
    /// Paths are canonicalized when possible so `./a` and `/abs/a` contend for
    /// the same lock.
    pub fn lock(&self, folder: &Path) -> FolderGuard<'_> {
        let key = lock_key(folder);
        let mut busy = self.busy_set();
        while busy.contains(&key) {
            trace!(folder = %key.display(), "waiting for folder lock");
            busy = self
                .released
                .wait(busy)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        busy.insert(key.clone());
        FolderGuard { locks: self, key }
    }

    /// Whether an operation currently holds `folder`.
    pub fn is_locked(&self, folder: &Path) -> bool {
        self.busy_set().contains(&lock_key(folder))
    }

    fn busy_set(&self) -> MutexGuard<'_, HashSet<PathBuf>> {
        self.busy
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn lock_key(folder: &Path) -> PathBuf {
    folder
        .canonicalize()
        .unwrap_or_else(|_| folder.to_path_buf())
}

/// Releases the folder when dropped.
#[derive(Debug)]
pub struct FolderGuard<'a> {
    locks: &'a FolderLocks,
    key: PathBuf,
}

impl FolderGuard<'_> {
    pub fn folder(&self) -> &Path {
        &self.key
    }
}

impl Drop for FolderGuard<'_> {
    fn drop(&mut self) {
        self.locks.busy_set().remove(&self.key);
        self.locks.released.notify_all();
    }
}

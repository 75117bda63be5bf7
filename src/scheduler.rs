//! Periodic organize runs.
//!
//! A [`Scheduler`] arms at most one background thread. The thread sleeps on a
//! cancellation token until the next deadline, runs an organize pass through
//! the shared [`AppContext`], and repeats. Deadlines are computed from the
//! start time, so a slow pass shifts nothing; deadlines missed entirely are
//! skipped rather than run back to back.

use crate::activity::Activity;
use crate::context::AppContext;
use crate::error::ScheduleError;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Snapshot of the active schedule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleState {
    pub interval: Option<Duration>,
    pub is_running: bool,
    /// When the most recent tick finished.
    pub last_run: Option<DateTime<Utc>>,
    /// Ticks run since `start`.
    pub ticks: u64,
    pub folder: Option<PathBuf>,
}

#[derive(Debug, Default)]
struct CancelToken {
    cancelled: Mutex<bool>,
    signal: Condvar,
}

impl CancelToken {
    fn cancel(&self) {
        *self.flag() = true;
        self.signal.notify_all();
    }

    /// Sleeps until `deadline`. Returns true if cancelled first.
    fn wait_until(&self, deadline: Instant) -> bool {
        let mut cancelled = self.flag();
        loop {
            if *cancelled {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            cancelled = match self.signal.wait_timeout(cancelled, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    fn flag(&self) -> MutexGuard<'_, bool> {
        self.cancelled
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Debug)]
struct ActiveSchedule {
    token: Arc<CancelToken>,
    handle: JoinHandle<()>,
}

/// Runs organize on a folder at a fixed interval until stopped.
#[derive(Debug)]
pub struct Scheduler {
    ctx: Arc<AppContext>,
    active: Mutex<Option<ActiveSchedule>>,
    state: Arc<Mutex<ScheduleState>>,
}

impl Scheduler {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self {
            ctx,
            active: Mutex::new(None),
            state: Arc::new(Mutex::new(ScheduleState::default())),
        }
    }

    /// Arms the schedule. The first tick runs one `interval` from now.
    ///
    /// Calling `start` while a schedule is running replaces it.
    ///
    /// # Errors
    ///
    /// Returns `ScheduleError::InvalidInterval` for a zero interval; the
    /// current schedule, if any, is left untouched.
    pub fn start(&self, interval: Duration, folder: &Path) -> Result<(), ScheduleError> {
        if interval.is_zero() {
            return Err(ScheduleError::InvalidInterval(interval));
        }

        let mut active = lock(&self.active);
        if let Some(previous) = active.take() {
            debug!("replacing running schedule");
            Self::shut_down(previous);
        }

        *lock(&self.state) = ScheduleState {
            interval: Some(interval),
            is_running: true,
            last_run: None,
            ticks: 0,
            folder: Some(folder.to_path_buf()),
        };

        let token = Arc::new(CancelToken::default());
        let handle = {
            let ctx = Arc::clone(&self.ctx);
            let state = Arc::clone(&self.state);
            let token = Arc::clone(&token);
            let folder = folder.to_path_buf();
            thread::Builder::new()
                .name("foldersort-scheduler".to_string())
                .spawn(move || run_schedule(&ctx, &state, &token, interval, &folder))
        };

        let handle = match handle {
            Ok(handle) => handle,
            Err(e) => {
                *lock(&self.state) = ScheduleState::default();
                return Err(ScheduleError::SpawnFailed(e.to_string()));
            }
        };
        *active = Some(ActiveSchedule { token, handle });

        info!(folder = %folder.display(), ?interval, "schedule started");
        self.ctx.activity().record(
            Activity::ScheduleStart,
            format!("folder={} every={}s", folder.display(), interval.as_secs_f64()),
        );
        Ok(())
    }

    /// Disarms the schedule and waits for a tick in progress to finish.
    ///
    /// Returns the final state of the stopped schedule, or `None` if nothing
    /// was running.
    pub fn stop(&self) -> Option<ScheduleState> {
        let previous = lock(&self.active).take()?;
        Self::shut_down(previous);

        let final_state = std::mem::take(&mut *lock(&self.state));
        info!(ticks = final_state.ticks, "schedule stopped");
        self.ctx
            .activity()
            .record(Activity::ScheduleStop, format!("ticks={}", final_state.ticks));
        Some(ScheduleState {
            is_running: false,
            ..final_state
        })
    }

    pub fn state(&self) -> ScheduleState {
        lock(&self.state).clone()
    }

    pub fn is_running(&self) -> bool {
        lock(&self.state).is_running
    }

    fn shut_down(schedule: ActiveSchedule) {
        schedule.token.cancel();
        if schedule.handle.join().is_err() {
            error!("scheduler thread panicked");
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Some(active) = lock(&self.active).take() {
            Self::shut_down(active);
        }
    }
}

fn run_schedule(
    ctx: &AppContext,
    state: &Mutex<ScheduleState>,
    token: &CancelToken,
    interval: Duration,
    folder: &Path,
) {
    let mut deadline = Instant::now() + interval;
    while !token.wait_until(deadline) {
        debug!(folder = %folder.display(), "scheduled tick");
        // Failures are logged inside organize_as; the schedule keeps going.
        let _ = ctx.organize_as(folder, Activity::ScheduleTick);

        {
            let mut state = lock(state);
            state.ticks += 1;
            state.last_run = Some(Utc::now());
        }

        let now = Instant::now();
        deadline += interval;
        while deadline <= now {
            deadline += interval;
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

//! Tracing subscriber setup for the `foldersort` binary.
//!
//! Events go to stderr, filtered by `FOLDERSORT_LOG` or the `-v` flag, and
//! optionally to a file named by `FOLDERSORT_LOG_FILE`.

use std::env;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// Filter directives, e.g. `debug` or `foldersort=trace`.
pub const LOG_ENV: &str = "FOLDERSORT_LOG";

/// Optional path of a diagnostic log file.
pub const LOG_FILE_ENV: &str = "FOLDERSORT_LOG_FILE";

/// Installs the global tracing subscriber.
///
/// Terminal output goes to stderr so it never mixes with command output. The
/// level comes from `FOLDERSORT_LOG`, else `debug` when `verbose`, else `warn`.
/// When `FOLDERSORT_LOG_FILE` is set, events are also written there without
/// colors; keep the returned guard alive until exit so the file is flushed.
pub fn init_logger(verbose: bool) -> Option<WorkerGuard> {
    let default_filter = if verbose { "debug" } else { "warn" };
    let filter_layer = env::var(LOG_ENV)
        .ok()
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(default_filter));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .without_time();

    let (file_layer, guard) = match env::var_os(LOG_FILE_ENV) {
        Some(path) => {
            let path = Path::new(&path);
            let directory = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path.file_name().unwrap_or(path.as_os_str());
            let appender = tracing_appender::rolling::never(directory, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(non_blocking).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    // A second call (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter_layer)
        .with(stderr_layer)
        .with(file_layer)
        .try_init();

    guard
}

//! Command-line interface.
//!
//! Parses arguments with clap, builds the [`AppContext`] and renders results
//! through [`OutputFormatter`]. All filesystem work happens in the library.

use crate::config::AppConfig;
use crate::context::AppContext;
use crate::output::{OutputFormatter, human_bytes};
use crate::scheduler::Scheduler;
use crate::undo::UndoOutcome;
use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "foldersort", version)]
#[command(about = "Sort a folder's files into category subfolders", long_about = None)]
pub struct Cli {
    /// Configuration file (default: ./.foldersort.toml, then the user config dir)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Show debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Move the files of a folder into category subfolders
    Organize {
        folder: PathBuf,
        /// Show what would be moved without moving anything
        #[arg(long)]
        dry_run: bool,
        /// Copy the folder into its backup folder first
        #[arg(long, conflicts_with = "dry_run")]
        backup: bool,
    },
    /// Reverse the most recent organize
    Undo,
    /// Find files with identical content
    Duplicates {
        folder: PathBuf,
        /// Delete every copy except the oldest
        #[arg(long)]
        delete: bool,
        /// Do not ask before deleting
        #[arg(long, requires = "delete")]
        yes: bool,
    },
    /// Organize a folder periodically until Enter is pressed
    Schedule {
        folder: PathBuf,
        /// Seconds between runs (default from configuration)
        #[arg(long, value_name = "SECONDS")]
        every: Option<u64>,
    },
    /// Copy a folder into a timestamped snapshot inside it
    Backup { folder: PathBuf },
}

/// Runs a parsed command line.
///
/// # Errors
///
/// Returns an error when the command could not run at all (missing folder,
/// unreadable undo log, invalid interval). Per-file failures are printed and
/// do not produce an error.
pub fn run(cli: Cli) -> Result<()> {
    let config = AppConfig::load(cli.config.as_deref());
    let ctx = Arc::new(AppContext::new(&config).context("invalid configuration")?);

    match cli.command {
        Command::Organize {
            folder,
            dry_run,
            backup,
        } => {
            if dry_run {
                dry_run_organize(&ctx, &folder)
            } else {
                if backup {
                    run_backup(&ctx, &folder)?;
                }
                organize(&ctx, &folder)
            }
        }
        Command::Undo => undo(&ctx),
        Command::Duplicates {
            folder,
            delete,
            yes,
        } => duplicates(&ctx, &folder, delete, yes),
        Command::Schedule { folder, every } => {
            let seconds = every.unwrap_or(config.scheduler.interval_seconds);
            schedule(ctx, &folder, Duration::from_secs(seconds))
        }
        Command::Backup { folder } => run_backup(&ctx, &folder),
    }
}

fn organize(ctx: &AppContext, folder: &Path) -> Result<()> {
    OutputFormatter::info(&format!("Organizing {}", folder.display()));
    let report = ctx
        .organize(folder)
        .with_context(|| format!("cannot organize {}", folder.display()))?;

    if report.moved() == 0 && report.errors.is_empty() {
        OutputFormatter::success("Nothing to organize");
        return Ok(());
    }

    OutputFormatter::summary_table(&report.counts, report.moved());
    OutputFormatter::failures("ERRORS", &report.errors);
    if report.is_complete_success() {
        OutputFormatter::success(&format!("Organized {} files", report.moved()));
    } else {
        OutputFormatter::warning(&format!(
            "Organized {} files, {} failed",
            report.moved(),
            report.errors.len()
        ));
    }
    Ok(())
}

fn dry_run_organize(ctx: &AppContext, folder: &Path) -> Result<()> {
    let planned = ctx
        .plan(folder)
        .with_context(|| format!("cannot organize {}", folder.display()))?;
    OutputFormatter::dry_run_notice(&format!(
        "{} files would be moved in {}",
        planned.len(),
        folder.display()
    ));
    OutputFormatter::planned_moves(&planned, folder);
    if !planned.is_empty() {
        OutputFormatter::summary_table(&OutputFormatter::planned_counts(&planned), planned.len());
    }
    Ok(())
}

fn undo(ctx: &AppContext) -> Result<()> {
    let outcome = ctx.undo_last().context("cannot read the undo log")?;
    let report = match outcome {
        UndoOutcome::NothingToUndo => {
            OutputFormatter::info("Nothing to undo");
            return Ok(());
        }
        UndoOutcome::Completed(report) => report,
    };

    OutputFormatter::failures("SKIPPED", &report.skipped_files);
    OutputFormatter::failures("FAILED", &report.failed_restores);
    if report.is_complete_success() {
        OutputFormatter::success(&format!(
            "Restored {} files in {}",
            report.restored_files,
            report.base_path.display()
        ));
    } else {
        OutputFormatter::warning(&format!(
            "Restored {} of {} files",
            report.restored_files,
            report.total_processed()
        ));
        if !report.failed_restores.is_empty() {
            OutputFormatter::plain("Failed files were kept in the undo log; run undo again to retry.");
        }
    }
    Ok(())
}

fn duplicates(ctx: &AppContext, folder: &Path, delete: bool, yes: bool) -> Result<()> {
    OutputFormatter::info(&format!("Scanning {}", folder.display()));
    let mut bar = None;
    let report = ctx
        .find_duplicates_with_progress(folder, |done, total| {
            let pb = bar.get_or_insert_with(|| OutputFormatter::create_progress_bar(total as u64));
            pb.set_position(done as u64);
        })
        .with_context(|| format!("cannot scan {}", folder.display()))?;
    if let Some(pb) = bar {
        pb.finish_and_clear();
    }

    OutputFormatter::failures("UNREADABLE", &report.errors);
    if report.groups.is_empty() {
        OutputFormatter::success(&format!(
            "No duplicates among {} files",
            report.scanned_files
        ));
        return Ok(());
    }
    OutputFormatter::duplicate_groups(&report);

    if !delete {
        return Ok(());
    }
    let prompt = format!(
        "Permanently delete {} files ({})?",
        report.duplicate_count(),
        human_bytes(report.wasted_bytes())
    );
    if !yes && !prompt_confirm(&prompt)? {
        OutputFormatter::info("Nothing deleted");
        return Ok(());
    }

    let deletion = ctx.delete_duplicates(folder, &report.groups);
    OutputFormatter::failures("NOT DELETED", &deletion.errors);
    OutputFormatter::success(&format!("Deleted {} files", deletion.deleted.len()));
    Ok(())
}

fn schedule(ctx: Arc<AppContext>, folder: &Path, interval: Duration) -> Result<()> {
    if !folder.is_dir() {
        bail!("{} is not a directory", folder.display());
    }

    let scheduler = Scheduler::new(ctx);
    scheduler.start(interval, folder)?;
    OutputFormatter::info(&format!(
        "Organizing {} every {}s. Press Enter to stop.",
        folder.display(),
        interval.as_secs()
    ));

    // Returns on Enter or when stdin is closed.
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;

    if let Some(state) = scheduler.stop() {
        OutputFormatter::success(&format!("Stopped after {} runs", state.ticks));
    }
    Ok(())
}

fn run_backup(ctx: &AppContext, folder: &Path) -> Result<()> {
    let report = ctx
        .backup(folder)
        .with_context(|| format!("cannot back up {}", folder.display()))?;
    OutputFormatter::failures("NOT COPIED", &report.errors);
    OutputFormatter::success(&format!(
        "Backed up {} files ({}) to {}",
        report.copied_files,
        human_bytes(report.copied_bytes),
        report.snapshot_dir.display()
    ));
    Ok(())
}

// Defaults to no; end of input counts as no.
fn prompt_confirm(prompt: &str) -> io::Result<bool> {
    let stdin = io::stdin();
    let mut input = String::new();
    loop {
        input.clear();
        print!("{} (y/N): ", prompt);
        io::stdout().flush()?;

        if stdin.lock().read_line(&mut input)? == 0 {
            return Ok(false);
        }
        match input.trim().to_uppercase().as_str() {
            "Y" | "YES" => return Ok(true),
            "N" | "NO" | "" => return Ok(false),
            _ => continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_organize_flags() {
        let cli = Cli::parse_from(["foldersort", "-v", "organize", "/tmp/x", "--dry-run"]);
        assert!(cli.verbose);
        assert!(matches!(
            cli.command,
            Command::Organize {
                dry_run: true,
                backup: false,
                ..
            }
        ));
    }

    #[test]
    fn test_yes_requires_delete() {
        assert!(Cli::try_parse_from(["foldersort", "duplicates", "/tmp/x", "--yes"]).is_err());
        assert!(
            Cli::try_parse_from(["foldersort", "duplicates", "/tmp/x", "--delete", "--yes"])
                .is_ok()
        );
    }

    #[test]
    fn test_schedule_interval_and_global_config() {
        let cli = Cli::parse_from([
            "foldersort",
            "schedule",
            "/tmp/x",
            "--every",
            "60",
            "--config",
            "/etc/fs.toml",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/fs.toml")));
        assert!(matches!(cli.command, Command::Schedule { every: Some(60), .. }));
    }
}

//! Terminal output for the CLI.
//!
//! Everything the user sees goes through [`OutputFormatter`], so styling can
//! change in one place. Diagnostics go through `tracing` instead.

use crate::duplicates::{DuplicateGroup, ScanReport};
use crate::file_organizer::PlannedMove;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Styled console output.
pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints a success message in green with a checkmark.
    ///
    /// ```no_run
    /// use foldersort::output::OutputFormatter;
    /// OutputFormatter::success("Folder organized");
    /// ```
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    /// Prints an error message to stderr in red.
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow(), message);
    }

    pub fn info(message: &str) {
        println!("{}", message.cyan());
    }

    pub fn plain(message: &str) {
        println!("{}", message);
    }

    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    pub fn dry_run_notice(message: &str) {
        println!("{}", format!("[DRY RUN] {}", message).yellow());
    }

    /// Progress bar used while hashing files.
    ///
    /// ```no_run
    /// use foldersort::output::OutputFormatter;
    /// let pb = OutputFormatter::create_progress_bar(100);
    /// pb.inc(1);
    /// pb.finish_with_message("done");
    /// ```
    pub fn create_progress_bar(total: u64) -> ProgressBar {
        let pb = ProgressBar::new(total);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░");
        pb.set_style(style);
        pb
    }

    /// Prints files per category with a total row.
    ///
    /// ```no_run
    /// use foldersort::output::OutputFormatter;
    /// use std::collections::BTreeMap;
    ///
    /// let mut counts = BTreeMap::new();
    /// counts.insert("Documents".to_string(), 15);
    /// counts.insert("Images".to_string(), 8);
    /// OutputFormatter::summary_table(&counts, 23);
    /// ```
    pub fn summary_table(category_counts: &BTreeMap<String, usize>, total_files: usize) {
        Self::header("SUMMARY");

        let width = category_counts
            .keys()
            .map(|name| name.chars().count())
            .max()
            .unwrap_or(0)
            .max("Category".len());

        println!(
            "{:<width$} | {}",
            "Category".bold(),
            "Files".bold(),
            width = width
        );
        println!("{}", "-".repeat(width + 10));

        for (category, count) in category_counts {
            println!(
                "{:<width$} | {} {}",
                category,
                count.to_string().green(),
                files_word(*count),
                width = width
            );
        }

        println!("{}", "-".repeat(width + 10));
        println!(
            "{:<width$} | {} {}",
            "Total".bold(),
            total_files.to_string().green().bold(),
            files_word(total_files),
            width = width
        );
    }

    /// Counts per category label for a dry run.
    pub fn planned_counts(planned: &[PlannedMove]) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for planned_move in planned {
            *counts.entry(planned_move.category.label()).or_insert(0) += 1;
        }
        counts
    }

    pub fn planned_moves(planned: &[PlannedMove], base: &Path) {
        for planned_move in planned {
            let name = planned_move
                .source_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            Self::plain(&format!(
                "  {} → {}",
                name,
                relative_to(&planned_move.destination_dir, base).display()
            ));
        }
    }

    /// `(path, reason)` failures, one per line.
    pub fn failures(title: &str, failures: &[(PathBuf, String)]) {
        if failures.is_empty() {
            return;
        }
        Self::header(title);
        for (path, reason) in failures {
            println!("  {} {}: {}", "✗".red(), path.display(), reason);
        }
    }

    pub fn duplicate_groups(report: &ScanReport) {
        for (i, group) in report.groups.iter().enumerate() {
            Self::duplicate_group(i + 1, group);
        }
        Self::header("SUMMARY");
        println!(
            "Scanned {} files, {} duplicate groups, {} redundant files ({} reclaimable)",
            report.scanned_files,
            report.groups.len(),
            report.duplicate_count().to_string().yellow(),
            human_bytes(report.wasted_bytes())
        );
    }

    fn duplicate_group(number: usize, group: &DuplicateGroup) {
        println!(
            "\n{} {} ({} each, sha256 {})",
            "Group".bold(),
            number,
            human_bytes(group.size),
            &group.digest[..group.digest.len().min(12)]
        );
        if let Some(original) = group.original() {
            println!("  {} {}", "keep".green(), original.display());
        }
        for path in group.redundant() {
            println!("  {}  {}", "dup".yellow(), path.display());
        }
    }
}

fn files_word(count: usize) -> &'static str {
    if count == 1 { "file" } else { "files" }
}

fn relative_to<'a>(path: &'a Path, base: &Path) -> &'a Path {
    path.strip_prefix(base).unwrap_or(path)
}

/// Formats a byte count with binary units: `512 B`, `1.5 KiB`, `3.2 MiB`.
pub fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

/// Integration tests for foldersort
///
/// These tests drive the library the way the CLI does: through an
/// `AppContext` built from configuration, on real temporary folders.
///
/// Test categories:
/// 1. Basic organization workflows
/// 2. Idempotence and collision handling
/// 3. Undo round trips
/// 4. Duplicate detection
/// 5. Backup, scheduling and the activity log
/// 6. Configuration
use foldersort::config::AppConfig;
use foldersort::context::AppContext;
use foldersort::error::ScheduleError;
use foldersort::file_organizer::FileOrganizer;
use foldersort::scheduler::Scheduler;
use foldersort::undo::UndoOutcome;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

// ============================================================================
// Test Utilities
// ============================================================================

/// A folder to organize plus a separate state directory for the undo and
/// activity logs.
struct TestFixture {
    temp_dir: TempDir,
    state_dir: TempDir,
}

impl TestFixture {
    fn new() -> Self {
        TestFixture {
            temp_dir: TempDir::new().expect("Failed to create temp directory"),
            state_dir: TempDir::new().expect("Failed to create state directory"),
        }
    }

    /// Get the path to the folder under test.
    fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    fn activity_log(&self) -> PathBuf {
        self.state_dir.path().join("activity.log")
    }

    fn context(&self) -> AppContext {
        self.context_with(&AppConfig::default())
    }

    fn context_with(&self, config: &AppConfig) -> AppContext {
        AppContext::with_storage(
            config,
            self.state_dir.path().join("undo_log.jsonl"),
            Some(self.activity_log()),
        )
        .expect("Failed to build context")
    }

    fn create_file(&self, name: &str, content: &[u8]) {
        let file_path = self.path().join(name);
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directory");
        }
        let mut file = File::create(&file_path).expect("Failed to create file");
        file.write_all(content)
            .expect("Failed to write file content");
    }

    fn create_text_file(&self, name: &str, content: &str) {
        self.create_file(name, content.as_bytes());
    }

    fn create_files(&self, files: &[(&str, &[u8])]) {
        for (name, content) in files {
            self.create_file(name, content);
        }
    }

    fn assert_dir_exists(&self, rel_path: &str) {
        let path = self.path().join(rel_path);
        assert!(path.is_dir(), "Directory should exist: {}", path.display());
    }

    fn assert_file_exists(&self, rel_path: &str) {
        let path = self.path().join(rel_path);
        assert!(path.is_file(), "File should exist: {}", path.display());
    }

    fn assert_file_not_exists(&self, rel_path: &str) {
        let path = self.path().join(rel_path);
        assert!(!path.exists(), "File should not exist: {}", path.display());
    }

    /// Count files directly in the folder (non-recursive).
    fn count_files(&self) -> usize {
        fs::read_dir(self.path())
            .expect("Failed to read directory")
            .flatten()
            .filter(|e| e.file_type().is_ok_and(|t| t.is_file()))
            .count()
    }

    /// All files below the folder, relative to it, sorted.
    fn list_files_recursive(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        Self::walk_dir(self.path(), &mut files);
        let mut relative: Vec<PathBuf> = files
            .into_iter()
            .filter_map(|p| p.strip_prefix(self.path()).ok().map(Path::to_path_buf))
            .collect();
        relative.sort();
        relative
    }

    fn walk_dir(dir: &Path, files: &mut Vec<PathBuf>) {
        if let Ok(entries) = fs::read_dir(dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    Self::walk_dir(&path, files);
                } else {
                    files.push(path);
                }
            }
        }
    }

    fn activity_operations(&self) -> Vec<String> {
        fs::read_to_string(self.activity_log())
            .unwrap_or_default()
            .lines()
            .filter_map(|line| line.split('\t').nth(1).map(str::to_string))
            .collect()
    }
}

// Minimal headers so content sniffing recognizes extensionless files.
const PNG_HEADER: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D];
const PDF_HEADER: &[u8] = b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n";

// ============================================================================
// 1. Basic organization workflows
// ============================================================================

#[test]
fn test_organize_example_scenario() {
    let fixture = TestFixture::new();
    fixture.create_files(&[("a.jpg", b"a"), ("b.pdf", b"b"), ("c.xyz", b"c")]);

    let report = fixture.context().organize(fixture.path()).unwrap();

    assert_eq!(report.counts.get("Images"), Some(&1));
    assert_eq!(report.counts.get("Documents"), Some(&1));
    assert_eq!(report.counts.get("Others"), Some(&1));
    assert_eq!(report.move_records.len(), 3);
    assert!(report.errors.is_empty());

    fixture.assert_file_exists("Images/a.jpg");
    fixture.assert_file_exists("Documents/b.pdf");
    fixture.assert_file_exists("Others/c.xyz");
    assert_eq!(fixture.count_files(), 0);
}

#[test]
fn test_organize_mixed_case_extensions() {
    let fixture = TestFixture::new();
    fixture.create_files(&[("photo.JPG", b"x"), ("song.Mp3", b"y"), ("archive.tar.gz", b"z")]);

    fixture.context().organize(fixture.path()).unwrap();

    fixture.assert_file_exists("Images/photo.JPG");
    fixture.assert_file_exists("Music/song.Mp3");
    fixture.assert_file_exists("Archives/archive.tar.gz");
}

#[test]
fn test_extensionless_files_are_sniffed() {
    let fixture = TestFixture::new();
    fixture.create_file("scan", PDF_HEADER);
    fixture.create_file("picture", PNG_HEADER);
    fixture.create_text_file("README", "plain text");

    fixture.context().organize(fixture.path()).unwrap();

    fixture.assert_file_exists("Documents/scan");
    fixture.assert_file_exists("Images/picture");
    fixture.assert_file_exists("Others/README");
}

#[test]
fn test_subdirectories_and_hidden_files_are_left_alone() {
    let fixture = TestFixture::new();
    fixture.create_text_file("projects/notes.txt", "keep me");
    fixture.create_text_file(".hidden.txt", "hidden");
    fixture.create_text_file("todo.txt", "move me");

    let report = fixture.context().organize(fixture.path()).unwrap();

    assert_eq!(report.moved(), 1);
    fixture.assert_file_exists("projects/notes.txt");
    fixture.assert_file_exists(".hidden.txt");
    fixture.assert_file_exists("Documents/todo.txt");
}

#[test]
fn test_dry_run_moves_nothing() {
    let fixture = TestFixture::new();
    fixture.create_files(&[("a.jpg", b"a"), ("b.pdf", b"b")]);
    let ctx = fixture.context();

    let planned = ctx.plan(fixture.path()).unwrap();

    assert_eq!(planned.len(), 2);
    assert_eq!(planned[0].destination_dir, fixture.path().join("Images"));
    fixture.assert_file_exists("a.jpg");
    fixture.assert_file_exists("b.pdf");
    assert!(ctx.undo_store().load().unwrap().is_none());
}

#[test]
fn test_organize_missing_folder_is_an_error() {
    let fixture = TestFixture::new();
    let result = fixture.context().organize(&fixture.path().join("nope"));
    assert!(result.is_err());
}

// ============================================================================
// 2. Idempotence and collision handling
// ============================================================================

#[test]
fn test_second_organize_moves_nothing() {
    let fixture = TestFixture::new();
    fixture.create_files(&[("a.jpg", b"a"), ("b.pdf", b"b"), ("c.xyz", b"c")]);
    let ctx = fixture.context();

    let first = ctx.organize(fixture.path()).unwrap();
    let before = fixture.list_files_recursive();
    let second = ctx.organize(fixture.path()).unwrap();

    assert_eq!(first.moved(), 3);
    assert_eq!(second.moved(), 0);
    assert!(second.errors.is_empty());
    assert_eq!(fixture.list_files_recursive(), before);
}

#[test]
fn test_collision_keeps_both_files() {
    let fixture = TestFixture::new();
    fixture.create_text_file("Documents/x.txt", "already organized");
    fixture.create_text_file("x.txt", "new arrival");

    let report = fixture.context().organize(fixture.path()).unwrap();

    assert_eq!(report.moved(), 1);
    assert_eq!(
        report.move_records[0].destination_path,
        fixture.path().join("Documents").join("x (1).txt")
    );
    assert_eq!(
        fs::read_to_string(fixture.path().join("Documents/x.txt")).unwrap(),
        "already organized"
    );
    assert_eq!(
        fs::read_to_string(fixture.path().join("Documents/x (1).txt")).unwrap(),
        "new arrival"
    );
}

#[test]
fn test_mover_numbers_repeated_collisions() {
    let fixture = TestFixture::new();
    let dest = fixture.path().join("dest");
    for content in ["one", "two", "three"] {
        fixture.create_text_file("x.txt", content);
        FileOrganizer::move_file(&fixture.path().join("x.txt"), &dest).unwrap();
    }

    fixture.assert_file_exists("dest/x.txt");
    fixture.assert_file_exists("dest/x (1).txt");
    fixture.assert_file_exists("dest/x (2).txt");
    assert_eq!(
        fs::read_to_string(dest.join("x (2).txt")).unwrap(),
        "three"
    );
}

// ============================================================================
// 3. Undo round trips
// ============================================================================

#[test]
fn test_organize_then_undo_restores_everything() {
    let fixture = TestFixture::new();
    fixture.create_files(&[
        ("a.jpg", b"a"),
        ("b.pdf", b"b"),
        ("c.xyz", b"c"),
        ("d.mp4", b"d"),
    ]);
    let before = fixture.list_files_recursive();
    let ctx = fixture.context();

    let report = ctx.organize(fixture.path()).unwrap();
    assert_eq!(report.moved(), 4);

    let UndoOutcome::Completed(undo) = ctx.undo_last().unwrap() else {
        panic!("expected an undo report");
    };

    assert_eq!(undo.restored_files, 4);
    assert!(undo.is_complete_success());
    assert_eq!(fixture.list_files_recursive(), before);
    assert!(ctx.undo_store().load().unwrap().is_none());
    assert!(matches!(ctx.undo_last().unwrap(), UndoOutcome::NothingToUndo));
}

#[test]
fn test_undo_only_reverses_latest_pass() {
    let fixture = TestFixture::new();
    let ctx = fixture.context();

    fixture.create_text_file("first.txt", "1");
    ctx.organize(fixture.path()).unwrap();
    fixture.create_text_file("second.jpg", "2");
    ctx.organize(fixture.path()).unwrap();

    ctx.undo_last().unwrap();

    fixture.assert_file_exists("second.jpg");
    fixture.assert_file_exists("Documents/first.txt");
}

#[test]
fn test_undo_skips_files_the_user_removed() {
    let fixture = TestFixture::new();
    fixture.create_files(&[("a.jpg", b"a"), ("b.pdf", b"b")]);
    let ctx = fixture.context();
    ctx.organize(fixture.path()).unwrap();

    fs::remove_file(fixture.path().join("Images/a.jpg")).unwrap();

    let UndoOutcome::Completed(undo) = ctx.undo_last().unwrap() else {
        panic!("expected an undo report");
    };
    assert_eq!(undo.restored_files, 1);
    assert_eq!(undo.skipped_files.len(), 1);
    assert!(undo.failed_restores.is_empty());
    fixture.assert_file_exists("b.pdf");
    assert!(ctx.undo_store().load().unwrap().is_none());
}

#[test]
fn test_undo_after_restart_uses_persisted_log() {
    let fixture = TestFixture::new();
    fixture.create_text_file("a.jpg", "a");
    fixture.context().organize(fixture.path()).unwrap();

    // A fresh context reads the same undo log from disk.
    let UndoOutcome::Completed(undo) = fixture.context().undo_last().unwrap() else {
        panic!("expected an undo report");
    };
    assert_eq!(undo.restored_files, 1);
    fixture.assert_file_exists("a.jpg");
}

#[test]
fn test_undo_with_empty_store_is_noop() {
    let fixture = TestFixture::new();
    let ctx = fixture.context();

    assert!(matches!(ctx.undo_last().unwrap(), UndoOutcome::NothingToUndo));
    assert_eq!(fixture.activity_operations(), vec!["undo"]);
}

#[test]
fn test_relative_state_paths_inside_folder_are_left_alone() {
    // Relative paths resolve against the working directory, so the folder
    // has to live below it.
    let folder = TempDir::new_in(".").expect("Failed to create temp directory");
    let relative = PathBuf::from(folder.path().file_name().expect("temp dir has a name"));
    fs::write(folder.path().join("a.jpg"), "a").unwrap();
    fs::write(folder.path().join("b.pdf"), "b").unwrap();

    let ctx = AppContext::with_storage(
        &AppConfig::default(),
        relative.join("undo_log.jsonl"),
        Some(relative.join("activity.log")),
    )
    .expect("Failed to build context");

    let report = ctx.organize(&relative).unwrap();
    assert_eq!(report.moved(), 2);
    assert!(folder.path().join("undo_log.jsonl").is_file());
    assert!(folder.path().join("activity.log").is_file());
    assert!(!folder.path().join("Others").exists());

    let UndoOutcome::Completed(undo) = ctx.undo_last().unwrap() else {
        panic!("expected an undo report");
    };
    assert_eq!(undo.restored_files, 2);
    assert!(folder.path().join("a.jpg").is_file());
    assert!(folder.path().join("b.pdf").is_file());
}

// ============================================================================
// 4. Duplicate detection
// ============================================================================

#[test]
fn test_duplicates_group_identical_files_only() {
    let fixture = TestFixture::new();
    fixture.create_text_file("A.txt", "identical bytes");
    fixture.create_text_file("sub/B.txt", "identical bytes");
    fixture.create_text_file("C.txt", "different bytes");

    let report = fixture.context().find_duplicates(fixture.path()).unwrap();

    assert_eq!(report.groups.len(), 1);
    let mut members = report.groups[0].files.clone();
    members.sort();
    assert_eq!(
        members,
        vec![fixture.path().join("A.txt"), fixture.path().join("sub/B.txt")]
    );
    assert!(
        report
            .groups
            .iter()
            .all(|g| !g.files.contains(&fixture.path().join("C.txt")))
    );
}

#[test]
fn test_delete_duplicates_keeps_one_copy() {
    let fixture = TestFixture::new();
    fixture.create_text_file("one.txt", "dup");
    fixture.create_text_file("two.txt", "dup");
    fixture.create_text_file("three.txt", "dup");
    let ctx = fixture.context();

    let report = ctx.find_duplicates(fixture.path()).unwrap();
    let kept = report.groups[0].original().unwrap().to_path_buf();
    let deletion = ctx.delete_duplicates(fixture.path(), &report.groups);

    assert_eq!(deletion.deleted.len(), 2);
    assert!(kept.exists());
    assert_eq!(fixture.count_files(), 1);
    assert!(ctx.find_duplicates(fixture.path()).unwrap().groups.is_empty());
}

#[test]
fn test_duplicates_ignore_backup_snapshots() {
    let fixture = TestFixture::new();
    fixture.create_text_file("a.txt", "only copy");
    let ctx = fixture.context();

    ctx.backup(fixture.path()).unwrap();
    let report = ctx.find_duplicates(fixture.path()).unwrap();

    assert!(report.groups.is_empty());
    assert_eq!(report.scanned_files, 1);
}

// ============================================================================
// 5. Backup, scheduling and the activity log
// ============================================================================

#[test]
fn test_backup_before_organize() {
    let fixture = TestFixture::new();
    fixture.create_files(&[("a.jpg", b"a"), ("b.pdf", b"b")]);
    let ctx = fixture.context();

    let backup = ctx.backup(fixture.path()).unwrap();
    let report = ctx.organize(fixture.path()).unwrap();

    assert_eq!(backup.copied_files, 2);
    assert!(backup.snapshot_dir.join("a.jpg").is_file());
    assert_eq!(report.moved(), 2);
    fixture.assert_dir_exists("_backup");
    // The snapshot stays in place after organizing.
    assert!(backup.snapshot_dir.join("b.pdf").is_file());
}

#[test]
fn test_scheduler_ticks_and_stops() {
    let fixture = TestFixture::new();
    let scheduler = Scheduler::new(Arc::new(fixture.context()));

    scheduler
        .start(Duration::from_secs(1), fixture.path())
        .unwrap();
    thread::sleep(Duration::from_millis(2500));

    assert!(scheduler.state().ticks >= 2);
    let stopped = scheduler.stop().expect("schedule was running");
    assert!(stopped.ticks >= 2);
    assert!(!scheduler.is_running());

    // Nothing runs after stop.
    fixture.create_text_file("late.jpg", "l");
    thread::sleep(Duration::from_millis(1500));
    fixture.assert_file_exists("late.jpg");
    fixture.assert_file_not_exists("Images/late.jpg");
}

#[test]
fn test_scheduler_rejects_zero_interval() {
    let fixture = TestFixture::new();
    let scheduler = Scheduler::new(Arc::new(fixture.context()));

    let result = scheduler.start(Duration::ZERO, fixture.path());

    assert_eq!(result, Err(ScheduleError::InvalidInterval(Duration::ZERO)));
    assert!(!scheduler.is_running());
}

#[test]
fn test_scheduled_run_waits_for_manual_organize() {
    let fixture = TestFixture::new();
    fixture.create_text_file("a.jpg", "a");
    let ctx = Arc::new(fixture.context());

    // Hold the folder as an in-flight organize would.
    let guard = ctx.locks().lock(fixture.path());
    let scheduler = Scheduler::new(Arc::clone(&ctx));
    scheduler
        .start(Duration::from_millis(100), fixture.path())
        .unwrap();
    thread::sleep(Duration::from_millis(400));

    fixture.assert_file_exists("a.jpg");
    assert_eq!(scheduler.state().ticks, 0);

    drop(guard);
    thread::sleep(Duration::from_millis(400));
    scheduler.stop();
    fixture.assert_file_exists("Images/a.jpg");
}

#[test]
fn test_activity_log_records_operations() {
    let fixture = TestFixture::new();
    fixture.create_text_file("a.jpg", "a");
    let ctx = fixture.context();

    ctx.backup(fixture.path()).unwrap();
    ctx.organize(fixture.path()).unwrap();
    ctx.find_duplicates(fixture.path()).unwrap();
    ctx.undo_last().unwrap();

    assert_eq!(
        fixture.activity_operations(),
        vec!["backup", "organize", "find-duplicates", "undo"]
    );
    let content = fs::read_to_string(fixture.activity_log()).unwrap();
    for line in content.lines() {
        let timestamp = line.split('\t').next().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
    }
}

// ============================================================================
// 6. Configuration
// ============================================================================

#[test]
fn test_configured_subcategories() {
    let fixture = TestFixture::new();
    let config = AppConfig::from_toml(
        r#"
        [[categories]]
        name = "Documents"
        extensions = ["txt"]

          [[categories.subcategories]]
          name = "PDF"
          extensions = ["pdf"]

          [[categories.subcategories]]
          name = "Word"
          extensions = ["docx", "doc"]
        "#,
    )
    .unwrap();
    fixture.create_files(&[("a.pdf", b"a"), ("b.docx", b"b"), ("c.txt", b"c"), ("d.jpg", b"d")]);

    let report = fixture.context_with(&config).organize(fixture.path()).unwrap();

    assert_eq!(report.counts.get("Documents/PDF"), Some(&1));
    assert_eq!(report.counts.get("Documents/Word"), Some(&1));
    assert_eq!(report.counts.get("Documents/Others"), Some(&1));
    assert_eq!(report.counts.get("Others"), Some(&1));
    fixture.assert_file_exists("Documents/PDF/a.pdf");
    fixture.assert_file_exists("Documents/Word/b.docx");
    fixture.assert_file_exists("Documents/Others/c.txt");
}

#[test]
fn test_config_file_falls_back_to_defaults() {
    let fixture = TestFixture::new();
    fixture.create_text_file("broken.toml", "[[categories]\nname = ");

    let config = AppConfig::load(Some(&fixture.path().join("broken.toml")));

    assert_eq!(config.fallback_category, "Others");
    assert_eq!(config.categories.rules().len(), 7);
}

#[test]
fn test_config_exclusions_are_respected() {
    let fixture = TestFixture::new();
    let config = AppConfig::from_toml(
        r#"
        [filters.exclude]
        extensions = ["part"]
        filenames = ["keep.jpg"]
        "#,
    )
    .unwrap();
    fixture.create_files(&[("movie.part", b"p"), ("keep.jpg", b"k"), ("go.jpg", b"g")]);

    let report = fixture.context_with(&config).organize(fixture.path()).unwrap();

    assert_eq!(report.moved(), 1);
    fixture.assert_file_exists("movie.part");
    fixture.assert_file_exists("keep.jpg");
    fixture.assert_file_exists("Images/go.jpg");
}

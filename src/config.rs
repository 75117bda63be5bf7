//! Configuration loading and file filtering.
//!
//! The configuration file is TOML. Every section is optional; anything that is
//! missing takes its built-in default, and a file that cannot be read, parsed
//! or validated is reported as a warning and replaced by the defaults as a
//! whole.
//!
//! # Configuration File Format
//!
//! ```toml
//! fallback_category = "Others"
//! sniff_extensionless = true
//!
//! [[categories]]
//! name = "Images"
//! extensions = ["png", "jpg"]
//!
//! [[categories]]
//! name = "Documents"
//! extensions = ["pdf", "txt"]
//!
//!   [[categories.subcategories]]
//!   name = "PDF"
//!   extensions = ["pdf"]
//!
//! [filters]
//! enable_hidden_files = false
//!
//! [filters.exclude]
//! filenames = ["Thumbs.db"]
//! patterns = ["*.part"]
//! extensions = ["tmp"]
//! regex = []
//!
//! [filters.include]
//! patterns = []
//!
//! [backup]
//! folder_name = "_backup"
//!
//! [storage]
//! state_dir = "/home/me/.local/share/foldersort"
//!
//! [scheduler]
//! interval_seconds = 3600
//! ```

use crate::error::ConfigError;
use crate::file_category::{CategoryResolver, CategoryTable};
use glob::Pattern;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Name of the per-directory configuration file.
pub const LOCAL_CONFIG_FILE: &str = ".foldersort.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Category for files whose extension is not in the table.
    pub fallback_category: String,

    /// Detect the type of extensionless files from their content.
    pub sniff_extensionless: bool,

    /// Ordered category table. First match wins.
    pub categories: CategoryTable,

    /// Rules for which files are left alone by organize.
    pub filters: FilterRules,

    pub backup: BackupSettings,

    pub storage: StorageSettings,

    pub scheduler: SchedulerSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            fallback_category: "Others".to_string(),
            sniff_extensionless: true,
            categories: CategoryTable::default(),
            filters: FilterRules::default(),
            backup: BackupSettings::default(),
            storage: StorageSettings::default(),
            scheduler: SchedulerSettings::default(),
        }
    }
}

/// Backup snapshot settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupSettings {
    /// Folder inside the organized folder that receives backup snapshots.
    pub folder_name: String,
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            folder_name: "_backup".to_string(),
        }
    }
}

/// Where foldersort keeps its own files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Base directory for the undo log and activity log.
    pub state_dir: Option<PathBuf>,
    /// Overrides `<state_dir>/undo_log.jsonl`.
    pub undo_log: Option<PathBuf>,
    /// Overrides `<state_dir>/activity.log`.
    pub activity_log: Option<PathBuf>,
}

impl StorageSettings {
    /// Resolved state directory: configured value, else the platform's local
    /// data directory, else `.foldersort` in the working directory.
    pub fn state_dir(&self) -> PathBuf {
        self.state_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .map(|d| d.join("foldersort"))
                .unwrap_or_else(|| PathBuf::from(".foldersort"))
        })
    }

    pub fn undo_log_path(&self) -> PathBuf {
        self.undo_log
            .clone()
            .unwrap_or_else(|| self.state_dir().join("undo_log.jsonl"))
    }

    pub fn activity_log_path(&self) -> PathBuf {
        self.activity_log
            .clone()
            .unwrap_or_else(|| self.state_dir().join("activity.log"))
    }
}

/// Scheduler defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    /// Interval used when the CLI is not given `--every`.
    pub interval_seconds: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            interval_seconds: 3600,
        }
    }
}

impl AppConfig {
    /// Loads configuration, falling back to defaults on any problem.
    ///
    /// Lookup order:
    /// 1. `config_path`, if provided
    /// 2. `.foldersort.toml` in the current directory
    /// 3. `foldersort/config.toml` in the platform config directory
    /// 4. Built-in defaults
    ///
    /// A missing, unreadable, malformed or invalid file is logged as a warning
    /// and the built-in defaults are used instead.
    pub fn load(config_path: Option<&Path>) -> Self {
        match Self::try_load(config_path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "using default configuration");
                Self::default()
            }
        }
    }

    /// Strict variant of [`load`](Self::load) that reports the failure.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotFound` if an explicit path does not exist, or
    /// any parsing/validation error of the file that was found.
    pub fn try_load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        let local_config = PathBuf::from(LOCAL_CONFIG_FILE);
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("foldersort").join("config.toml");
            if user_config.exists() {
                return Self::load_from_file(&user_config);
            }
        }

        debug!("no configuration file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotFound` if file does not exist.
    /// Returns `ConfigError::Invalid` if TOML parsing or validation fails.
    /// Returns `ConfigError::Io` if file cannot be read.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let config = Self::from_toml(&content)?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Parses and validates a TOML document.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        config.validated()
    }

    /// Normalizes extensions and checks that every name can be used as a
    /// folder and every filter compiles.
    pub fn validated(mut self) -> Result<Self, ConfigError> {
        self.categories = self.categories.normalized();

        validate_folder_name(&self.fallback_category)?;
        validate_folder_name(&self.backup.folder_name)?;

        let mut seen = HashSet::new();
        for rule in self.categories.rules() {
            validate_folder_name(&rule.name)?;
            if rule.name == self.backup.folder_name {
                return Err(ConfigError::InvalidCategory {
                    name: rule.name.clone(),
                    reason: "clashes with the backup folder name".to_string(),
                });
            }
            if !seen.insert(rule.name.as_str()) {
                return Err(ConfigError::InvalidCategory {
                    name: rule.name.clone(),
                    reason: "declared more than once".to_string(),
                });
            }
            for sub in &rule.subcategories {
                validate_folder_name(&sub.name)?;
            }
        }

        CompiledFilters::new(&self.filters)?;
        Ok(self)
    }

    /// Builds the category resolver described by this configuration.
    pub fn resolver(&self) -> CategoryResolver {
        CategoryResolver::new(self.categories.clone(), &self.fallback_category)
            .with_content_sniffing(self.sniff_extensionless)
    }
}

fn validate_folder_name(name: &str) -> Result<(), ConfigError> {
    let reason = if name.trim().is_empty() {
        Some("name is empty")
    } else if name == "." || name == ".." {
        Some("name is a relative path component")
    } else if name.contains('/') || name.contains('\\') {
        Some("name contains a path separator")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(ConfigError::InvalidCategory {
            name: name.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

/// Filter rules that decide which files organize leaves in place.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterRules {
    /// Whether to include hidden files (starting with "."). Defaults to false.
    #[serde(default)]
    pub enable_hidden_files: bool,

    /// Rules for excluding files.
    #[serde(default)]
    pub exclude: ExcludeRules,

    /// Rules for including files (whitelist, overrides exclude rules).
    #[serde(default)]
    pub include: IncludeRules,
}

/// Rules for excluding files from organization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExcludeRules {
    /// Exact filenames to exclude (e.g., "Thumbs.db", "desktop.ini").
    #[serde(default)]
    pub filenames: Vec<String>,

    /// Glob patterns to exclude (e.g., "*.part", "*.crdownload").
    #[serde(default)]
    pub patterns: Vec<String>,

    /// File extensions to exclude (e.g., "tmp").
    #[serde(default)]
    pub extensions: Vec<String>,

    /// Regex patterns matched against the file name.
    #[serde(default)]
    pub regex: Vec<String>,
}

/// Rules for including files, overriding exclude rules (whitelist).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IncludeRules {
    /// Glob patterns that override exclude rules.
    #[serde(default)]
    pub patterns: Vec<String>,
}

/// Filter rules compiled once for repeated matching.
#[derive(Debug, Default)]
pub struct CompiledFilters {
    enable_hidden_files: bool,
    exclude_filenames: HashSet<String>,
    exclude_extensions: HashSet<String>,
    exclude_patterns: Vec<Pattern>,
    exclude_regexes: Vec<Regex>,
    include_patterns: Vec<Pattern>,
}

impl CompiledFilters {
    /// Create compiled filters from filter rules.
    ///
    /// # Errors
    ///
    /// Returns an error if any glob or regex patterns are invalid.
    pub fn new(rules: &FilterRules) -> Result<Self, ConfigError> {
        let compile_globs = |patterns: &[String]| {
            patterns
                .iter()
                .map(|pattern| {
                    Pattern::new(pattern)
                        .map_err(|_| ConfigError::InvalidGlobPattern(pattern.clone()))
                })
                .collect::<Result<Vec<_>, _>>()
        };

        let exclude_regexes = rules
            .exclude
            .regex
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| ConfigError::InvalidRegexPattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            enable_hidden_files: rules.enable_hidden_files,
            exclude_filenames: rules.exclude.filenames.iter().cloned().collect(),
            exclude_extensions: rules
                .exclude
                .extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_lowercase())
                .collect(),
            exclude_patterns: compile_globs(&rules.exclude.patterns)?,
            exclude_regexes,
            include_patterns: compile_globs(&rules.include.patterns)?,
        })
    }

    /// Check if a file should be organized (not excluded).
    ///
    /// Checks are performed in this order, with early termination:
    /// 1. Include patterns (whitelist) - if matched, always include
    /// 2. Hidden file filter - if hidden and disabled, exclude
    /// 3. Exact filename match - if matched, exclude
    /// 4. File extension match - if matched, exclude
    /// 5. Glob pattern match - if matched, exclude
    /// 6. Regex pattern match - if matched, exclude
    /// 7. Default: include
    pub fn should_include(&self, file_path: &Path) -> bool {
        let file_name = file_path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();

        if self.matches_any(&self.include_patterns, file_path, &file_name) {
            return true;
        }

        if !self.enable_hidden_files && file_name.starts_with('.') {
            return false;
        }

        if self.exclude_filenames.contains(file_name.as_ref()) {
            return false;
        }

        if let Some(ext) = file_path.extension() {
            let ext_lower = ext.to_string_lossy().to_lowercase();
            if self.exclude_extensions.contains(&ext_lower) {
                return false;
            }
        }

        if self.matches_any(&self.exclude_patterns, file_path, &file_name) {
            return false;
        }

        !self
            .exclude_regexes
            .iter()
            .any(|regex| regex.is_match(&file_name))
    }

    // Organize hands us absolute paths, so patterns are tried against the
    // bare file name as well as the full path.
    fn matches_any(&self, patterns: &[Pattern], file_path: &Path, file_name: &str) -> bool {
        patterns
            .iter()
            .any(|pattern| pattern.matches_path(file_path) || pattern.matches(file_name))
    }
}

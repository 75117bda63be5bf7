//! File categorization by extension.
//!
//! This module maps a file name's extension to the category folder it is
//! sorted into. The mapping is plain data (a [`CategoryTable`]) so that users
//! can reshape it from the configuration file, including nested subcategories
//! such as `Documents/PDF`.
//!
//! # Examples
//!
//! ```
//! use foldersort::file_category::{CategoryResolver, CategoryTable};
//!
//! let resolver = CategoryResolver::new(CategoryTable::default(), "Others");
//! assert_eq!(resolver.resolve("holiday.JPG").label(), "Images");
//! assert_eq!(resolver.resolve("notes.txt").label(), "Documents");
//! assert_eq!(resolver.resolve("mystery.xyz").label(), "Others");
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A nested bucket inside a category (e.g. `PDF` inside `Documents`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubcategoryRule {
    pub name: String,
    #[serde(default)]
    pub extensions: Vec<String>,
}

/// One category and the extensions that belong to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRule {
    /// Folder name the files are moved into.
    pub name: String,
    /// Lowercase extensions without the leading dot.
    #[serde(default)]
    pub extensions: Vec<String>,
    /// Optional finer buckets. When present, every file of this category lands
    /// in one of them, unmatched extensions going to the fallback bucket.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subcategories: Vec<SubcategoryRule>,
}

impl CategoryRule {
    fn new(name: &str, extensions: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            extensions: extensions.iter().map(|e| e.to_string()).collect(),
            subcategories: Vec::new(),
        }
    }
}

/// Ordered list of category rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryTable {
    rules: Vec<CategoryRule>,
}

impl CategoryTable {
    pub fn new(rules: Vec<CategoryRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[CategoryRule] {
        &self.rules
    }

    /// Top-level category folder names, in table order.
    pub fn category_names(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.name.as_str())
    }

    /// Normalizes every extension: trims whitespace, strips a leading dot and
    /// lowercases. Empty entries are dropped.
    pub fn normalized(mut self) -> Self {
        fn clean(exts: &mut Vec<String>) {
            *exts = exts
                .iter()
                .map(|e| e.trim().trim_start_matches('.').to_lowercase())
                .filter(|e| !e.is_empty())
                .collect();
        }
        for rule in &mut self.rules {
            clean(&mut rule.extensions);
            for sub in &mut rule.subcategories {
                clean(&mut sub.extensions);
            }
        }
        self
    }
}

impl Default for CategoryTable {
    fn default() -> Self {
        Self::new(vec![
            CategoryRule::new(
                "Images",
                &[
                    "png", "jpg", "jpeg", "gif", "bmp", "webp", "svg", "tiff", "ico", "heic",
                ],
            ),
            CategoryRule::new(
                "Documents",
                &[
                    "pdf", "docx", "doc", "txt", "pptx", "xlsx", "md", "rtf", "odt", "csv",
                    "xls", "ods", "ppt", "odp",
                ],
            ),
            CategoryRule::new(
                "Videos",
                &["mp4", "mkv", "avi", "mov", "flv", "wmv", "webm", "3gp"],
            ),
            CategoryRule::new("Music", &["mp3", "wav", "m4a", "ogg", "flac", "aac", "wma"]),
            CategoryRule::new("Archives", &["zip", "rar", "7z", "tar", "gz", "bz2", "xz"]),
            CategoryRule::new(
                "Code",
                &[
                    "py", "java", "c", "cpp", "h", "hpp", "js", "ts", "rs", "go", "sh", "json",
                    "xml", "yaml", "yml", "toml", "html", "htm",
                ],
            ),
            CategoryRule::new("Fonts", &["ttf", "otf", "woff", "woff2"]),
        ])
    }
}

/// Where a file should go, relative to the organized folder.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Resolved {
    pub category: String,
    pub subcategory: Option<String>,
}

impl Resolved {
    /// Display label used for counts, e.g. `Documents/PDF`.
    pub fn label(&self) -> String {
        match &self.subcategory {
            Some(sub) => format!("{}/{}", self.category, sub),
            None => self.category.clone(),
        }
    }

    /// Destination directory relative to the organized folder.
    pub fn relative_dir(&self) -> PathBuf {
        let mut dir = PathBuf::from(&self.category);
        if let Some(sub) = &self.subcategory {
            dir.push(sub);
        }
        dir
    }
}

/// Resolves file names to categories using a [`CategoryTable`].
#[derive(Debug, Clone)]
pub struct CategoryResolver {
    table: CategoryTable,
    fallback: String,
    sniff_extensionless: bool,
    // extension -> (rule index, subcategory index)
    index: HashMap<String, (usize, Option<usize>)>,
}

impl CategoryResolver {
    /// Builds the lookup index. When an extension is listed more than once
    /// the first occurrence wins; within a category, subcategory lists are
    /// consulted before the category's own list.
    pub fn new(table: CategoryTable, fallback: &str) -> Self {
        let table = table.normalized();
        let mut index: HashMap<String, (usize, Option<usize>)> = HashMap::new();

        for (rule_idx, rule) in table.rules.iter().enumerate() {
            let sub_entries = rule
                .subcategories
                .iter()
                .enumerate()
                .flat_map(|(sub_idx, sub)| sub.extensions.iter().map(move |e| (e, Some(sub_idx))));
            let own_entries = rule.extensions.iter().map(|e| (e, None));

            for (ext, sub_idx) in sub_entries.chain(own_entries) {
                if let Some((existing, _)) = index.get(ext) {
                    if *existing != rule_idx {
                        warn!(
                            extension = %ext,
                            kept = %table.rules[*existing].name,
                            ignored = %rule.name,
                            "extension listed in more than one category"
                        );
                    }
                    continue;
                }
                index.insert(ext.clone(), (rule_idx, sub_idx));
            }
        }

        Self {
            table,
            fallback: fallback.to_string(),
            sniff_extensionless: false,
            index,
        }
    }

    /// Enables content sniffing for files that have no extension at all.
    pub fn with_content_sniffing(mut self, enabled: bool) -> Self {
        self.sniff_extensionless = enabled;
        self
    }

    pub fn table(&self) -> &CategoryTable {
        &self.table
    }

    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    /// Maps an extension (any case, no dot) to its destination.
    pub fn resolve_extension(&self, ext: &str) -> Resolved {
        let Some(&(rule_idx, sub_idx)) = self.index.get(&ext.to_lowercase()) else {
            return self.fallback_resolution();
        };
        let rule = &self.table.rules[rule_idx];

        let subcategory = match sub_idx {
            Some(i) => Some(rule.subcategories[i].name.clone()),
            None if !rule.subcategories.is_empty() => Some(self.fallback.clone()),
            None => None,
        };

        Resolved {
            category: rule.name.clone(),
            subcategory,
        }
    }

    /// Resolves a file name by the suffix after its last dot. Never fails:
    /// unknown or missing extensions go to the fallback category.
    pub fn resolve(&self, file_name: &str) -> Resolved {
        match Path::new(file_name).extension() {
            Some(ext) => self.resolve_extension(&ext.to_string_lossy()),
            None => self.fallback_resolution(),
        }
    }

    /// Like [`resolve`](Self::resolve), but for a file on disk. Files without
    /// an extension are sniffed with `infer` when content sniffing is on.
    pub fn resolve_path(&self, path: &Path) -> Resolved {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if self.sniff_extensionless && path.extension().is_none() {
            match infer::get_from_path(path) {
                Ok(Some(kind)) => {
                    debug!(file = %path.display(), mime = kind.mime_type(), "sniffed file type");
                    return self.resolve_extension(kind.extension());
                }
                Ok(None) => {}
                Err(e) => debug!(file = %path.display(), error = %e, "could not sniff file type"),
            }
        }

        self.resolve(&name)
    }

    fn fallback_resolution(&self) -> Resolved {
        Resolved {
            category: self.fallback.clone(),
            subcategory: None,
        }
    }
}

impl Default for CategoryResolver {
    fn default() -> Self {
        Self::new(CategoryTable::default(), "Others")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn documents_with_subcategories() -> CategoryTable {
        CategoryTable::new(vec![
            CategoryRule::new("Images", &["png", "jpg"]),
            CategoryRule {
                name: "Documents".to_string(),
                extensions: vec!["txt".to_string(), "pdf".to_string()],
                subcategories: vec![
                    SubcategoryRule {
                        name: "PDF".to_string(),
                        extensions: vec!["pdf".to_string()],
                    },
                    SubcategoryRule {
                        name: "Word".to_string(),
                        extensions: vec!["doc".to_string(), "docx".to_string()],
                    },
                ],
            },
        ])
    }

    #[test]
    fn test_default_table_categories() {
        let resolver = CategoryResolver::default();
        for rule in CategoryTable::default().rules() {
            for ext in &rule.extensions {
                let name = format!("file.{}", ext);
                assert_eq!(resolver.resolve(&name).label(), rule.name, "{}", name);
            }
        }
    }

    #[test]
    fn test_default_table_has_unique_extensions() {
        let mut seen = std::collections::HashSet::new();
        for rule in CategoryTable::default().rules() {
            for ext in &rule.extensions {
                assert!(seen.insert(ext.clone()), "duplicate extension {}", ext);
            }
        }
    }

    #[test]
    fn test_resolve_is_case_insensitive() {
        let resolver = CategoryResolver::default();
        assert_eq!(resolver.resolve("PHOTO.JPG").label(), "Images");
        assert_eq!(resolver.resolve("Song.Mp3").label(), "Music");
    }

    #[test]
    fn test_unknown_extension_goes_to_fallback() {
        let resolver = CategoryResolver::default();
        assert_eq!(resolver.resolve("c.xyz").label(), "Others");
        assert_eq!(resolver.resolve("Makefile").label(), "Others");
        assert_eq!(resolver.resolve("trailing.").label(), "Others");
    }

    #[test]
    fn test_last_suffix_is_used() {
        let resolver = CategoryResolver::default();
        assert_eq!(resolver.resolve("backup.tar.gz").label(), "Archives");
        assert_eq!(resolver.resolve("report.final.pdf").label(), "Documents");
    }

    #[test]
    fn test_first_match_wins() {
        let table = CategoryTable::new(vec![
            CategoryRule::new("First", &["dup"]),
            CategoryRule::new("Second", &["dup", "only"]),
        ]);
        let resolver = CategoryResolver::new(table, "Others");
        assert_eq!(resolver.resolve("a.dup").label(), "First");
        assert_eq!(resolver.resolve("a.only").label(), "Second");
    }

    #[test]
    fn test_subcategories() {
        let resolver = CategoryResolver::new(documents_with_subcategories(), "Others");
        assert_eq!(resolver.resolve("b.pdf").label(), "Documents/PDF");
        assert_eq!(resolver.resolve("b.docx").label(), "Documents/Word");
        // Listed on the category but in no subcategory.
        assert_eq!(resolver.resolve("b.txt").label(), "Documents/Others");
        assert_eq!(resolver.resolve("a.png").label(), "Images");
        assert_eq!(
            resolver.resolve("b.pdf").relative_dir(),
            PathBuf::from("Documents").join("PDF")
        );
    }

    #[test]
    fn test_extensions_are_normalized() {
        let table = CategoryTable::new(vec![CategoryRule::new("Raw", &[".CR2", " nef "])]);
        let resolver = CategoryResolver::new(table, "Others");
        assert_eq!(resolver.resolve("shot.cr2").label(), "Raw");
        assert_eq!(resolver.resolve("shot.NEF").label(), "Raw");
    }

    #[test]
    fn test_sniffs_extensionless_files() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let png = temp_dir.path().join("screenshot");
        fs::write(
            &png,
            [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D],
        )
        .expect("Failed to write file");

        let plain = CategoryResolver::default();
        assert_eq!(plain.resolve_path(&png).label(), "Others");

        let sniffing = CategoryResolver::default().with_content_sniffing(true);
        assert_eq!(sniffing.resolve_path(&png).label(), "Images");
    }

    #[test]
    fn test_sniffing_ignores_files_with_extension() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("image.xyz");
        fs::write(&path, [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A])
            .expect("Failed to write file");

        let resolver = CategoryResolver::default().with_content_sniffing(true);
        assert_eq!(resolver.resolve_path(&path).label(), "Others");
    }
}

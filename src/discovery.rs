//! Test discovery: find candidate test files under the source root.
//!
//! A file is a candidate when:
//! - its name matches `test*.<ext>`
//! - its full path matches the inclusion pattern (anchored, whole path)
//! - it does not live under a hidden or reserved root directory

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Serialize;
use walkdir::{DirEntry, WalkDir};

use crate::error::{ConfigError, ResourceError};

/// Root directories never searched for tests.
pub const RESERVED_ROOTS: &[&str] = &[
    "node_modules",
    "external",
    "tools",
    "tools_modules",
    "build",
    "dist",
    "reports",
];

/// A discovered test file.
#[derive(Debug, Clone, Serialize)]
pub struct TestFile {
    /// Absolute path.
    path: PathBuf,
    /// Path relative to the source root.
    relative: PathBuf,
}

impl TestFile {
    pub fn new(root: PathBuf, relative: PathBuf) -> Self {
        Self {
            path: root.join(&relative),
            relative,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn relative(&self) -> &Path {
        &self.relative
    }
}

// Ordered by the raw bytes of the full path, the same order `sort` gives.
impl Ord for TestFile {
    fn cmp(&self, other: &Self) -> Ordering {
        self.path.as_os_str().cmp(other.path.as_os_str())
    }
}

impl PartialOrd for TestFile {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for TestFile {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for TestFile {}

/// Discovery filters.
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    /// Test file extension, without the dot.
    pub extension: String,
    /// Inclusion pattern, already anchored to the whole path.
    pub include: Regex,
    /// Directory names excluded when they sit directly under the root.
    pub excluded_roots: Vec<String>,
}

impl DiscoveryOptions {
    /// Build options from an extension and an unanchored inclusion pattern.
    ///
    /// The pattern uses the `regex` crate syntax on every host and must match
    /// the whole path.
    pub fn new(extension: &str, include: &str) -> Result<Self, ConfigError> {
        let include = Regex::new(&format!("^(?:{include})$"))?;
        Ok(Self {
            extension: extension.trim_start_matches('.').to_string(),
            include,
            excluded_roots: RESERVED_ROOTS.iter().map(|s| s.to_string()).collect(),
        })
    }

    /// Whether `name` matches `test*.<ext>`.
    pub fn matches_name(&self, name: &str) -> bool {
        let suffix = format!(".{}", self.extension);
        name.len() >= "test".len() + suffix.len()
            && name.starts_with("test")
            && name.ends_with(&suffix)
    }

    fn is_excluded_root(&self, entry: &DirEntry) -> bool {
        if entry.depth() != 1 {
            return false;
        }
        let name = entry.file_name().to_string_lossy();
        name.starts_with('.') || self.excluded_roots.iter().any(|r| r.as_str() == name.as_ref())
    }
}

/// Recursively discover test files under `root`. No ordering is guaranteed.
/// Unreadable entries below the root are logged and skipped.
pub fn discover(root: &Path, options: &DiscoveryOptions) -> Result<Vec<TestFile>, ResourceError> {
    let mut found = Vec::new();

    let walker = WalkDir::new(root)
        .into_iter()
        .filter_entry(|entry| !options.is_excluded_root(entry));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            // An unreadable root means nothing can be discovered at all.
            Err(e) if e.depth() == 0 => {
                return Err(ResourceError::Walk {
                    path: e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf()),
                    reason: e.to_string(),
                });
            }
            Err(e) => {
                tracing::warn!(
                    path = %e.path().unwrap_or(root).display(),
                    error = %e,
                    "Skipping unreadable entry"
                );
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }
        if !options.matches_name(&entry.file_name().to_string_lossy()) {
            continue;
        }
        if !options.include.is_match(&entry.path().to_string_lossy()) {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(root)
            .unwrap_or_else(|_| entry.path())
            .to_path_buf();
        found.push(TestFile::new(root.to_path_buf(), relative));
    }

    tracing::debug!(root = %root.display(), count = found.len(), "Discovered test files");
    Ok(found)
}

//! Execution logs: per-test log files and the shared aggregate log.
//!
//! Logs are created before the command runs and kept afterwards, whether the
//! command passed or not.

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::error::ResourceError;

/// File name of the aggregate log for environment and task output.
pub const AGGREGATE_LOG: &str = "ci.log";

/// Slugify a relative path: every non-alphanumeric character becomes `_`,
/// runs of `_` collapse to one, and the result is lowercased.
///
/// `a/b-c.js` becomes `a_b_c_js`.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut last_was_sep = false;
    for c in input.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_was_sep = false;
        } else if !last_was_sep {
            slug.push('_');
            last_was_sep = true;
        }
    }
    slug
}

/// Slug for a path relative to the source root.
pub fn slug_for_path(relative: &Path) -> String {
    slugify(&relative.to_string_lossy())
}

/// Ownership to apply to created log files, as `uid:gid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogOwner {
    pub uid: u32,
    pub gid: u32,
}

impl std::str::FromStr for LogOwner {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (uid, gid) = s
            .split_once(':')
            .ok_or_else(|| format!("expected uid:gid, got {s:?}"))?;
        let uid = uid.trim().parse().map_err(|e| format!("bad uid: {e}"))?;
        let gid = gid.trim().parse().map_err(|e| format!("bad gid: {e}"))?;
        Ok(Self { uid, gid })
    }
}

/// Log directory for one worker.
#[derive(Debug, Clone)]
pub struct LogDir {
    root: PathBuf,
    owner: Option<LogOwner>,
}

impl LogDir {
    pub fn new(root: PathBuf, owner: Option<LogOwner>) -> Self {
        Self { root, owner }
    }

    /// Path of the aggregate environment/task log.
    pub fn aggregate(&self) -> PathBuf {
        self.root.join(AGGREGATE_LOG)
    }

    /// Path of the log for a test with the given slug.
    pub fn test_log(&self, slug: &str) -> PathBuf {
        self.root.join(format!("{slug}.log"))
    }

    /// Create the log directory.
    pub async fn ensure(&self) -> Result<(), ResourceError> {
        ensure_dir(&self.root).await
    }

    /// Create (or truncate) a log file and hand it to the configured owner.
    pub async fn create_log(&self, path: &Path) -> Result<(), ResourceError> {
        fs::File::create(path)
            .await
            .map_err(|source| ResourceError::CreateLog {
                path: path.to_path_buf(),
                source,
            })?;
        if let Some(owner) = self.owner {
            chown(path, owner)?;
        }
        Ok(())
    }
}

/// Create a directory and its parents.
pub async fn ensure_dir(path: &Path) -> Result<(), ResourceError> {
    fs::create_dir_all(path)
        .await
        .map_err(|source| ResourceError::CreateDir {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(unix)]
fn chown(path: &Path, owner: LogOwner) -> Result<(), ResourceError> {
    std::os::unix::fs::chown(path, Some(owner.uid), Some(owner.gid)).map_err(|source| {
        ResourceError::CreateLog {
            path: path.to_path_buf(),
            source,
        }
    })
}

#[cfg(not(unix))]
fn chown(path: &Path, _owner: LogOwner) -> Result<(), ResourceError> {
    tracing::warn!(path = %path.display(), "Log ownership is not supported on this platform");
    Ok(())
}

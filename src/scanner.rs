//! Tree scanning for Backstop
//!
//! [`TreeScanner`] walks one directory tree and records every regular file
//! as a [`FileRecord`] keyed by its path relative to the root.
//!
//! ## Rules
//!
//! - Symbolic links are never followed, so link cycles cannot trap the walk.
//!   Links themselves are not regular files and are left out of the snapshot.
//! - Directories and other non-regular entries contribute no records.
//! - A failure on any single entry aborts the whole scan. Skipping an
//!   unreadable file would make it look deleted, and the diff would then
//!   tombstone a perfectly good backup copy.
//! - Ignore patterns use gitignore-style globs matched against the relative
//!   path. A matching directory is not descended.
//!
//! ## Example
//!
//! ```rust,no_run
//! use backstop::scanner::TreeScanner;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let snapshot = TreeScanner::new("./photos")
//!     .with_ignore_patterns(vec!["*.tmp".to_string(), ".cache/".to_string()])
//!     .scan()?;
//! println!("{} files, {} bytes", snapshot.len(), snapshot.total_size());
//! # Ok(())
//! # }
//! ```

use crate::error::{BackstopError, Result};
use crate::types::{FileRecord, Snapshot};
use crate::utils;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, trace};
use walkdir::WalkDir;

/// Scanner producing a [`Snapshot`] of one directory tree
#[derive(Debug, Clone)]
pub struct TreeScanner {
    /// Root directory to scan
    root: PathBuf,
    /// Gitignore-style patterns of paths to leave out
    ignore_patterns: Vec<String>,
    /// Absolute directories to prune from the walk
    excluded_dirs: Vec<PathBuf>,
}

impl TreeScanner {
    /// Create a scanner for `root` with no ignore patterns
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ignore_patterns: Vec::new(),
            excluded_dirs: Vec::new(),
        }
    }

    /// Set ignore patterns
    ///
    /// Patterns follow gitignore syntax loosely: a pattern without a slash
    /// matches at any depth, a leading slash anchors it to the root, and a
    /// matching directory hides everything below it.
    pub fn with_ignore_patterns(mut self, patterns: Vec<String>) -> Self {
        self.ignore_patterns = patterns;
        self
    }

    /// Set directories to prune from the walk
    ///
    /// Used to keep a backup or tombstone root that lives inside the scanned
    /// tree out of its own snapshot. Paths are compared as given, so they
    /// should be canonical when the root is.
    pub fn with_excluded_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.excluded_dirs = dirs;
        self
    }

    /// Root this scanner walks
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walk the tree and capture every regular file
    ///
    /// # Errors
    ///
    /// - [`BackstopError::Scan`] if the root is missing or unreadable, or if
    ///   any entry cannot be read
    /// - [`BackstopError::ScanRootNotDirectory`] if the root is not a directory
    /// - [`BackstopError::InvalidPattern`] if an ignore pattern does not compile
    pub fn scan(&self) -> Result<Snapshot> {
        let start = Instant::now();
        let ignore = build_ignore_set(&self.ignore_patterns)?;

        let root_meta = std::fs::metadata(&self.root)
            .map_err(|e| BackstopError::scan(&self.root, e))?;
        if !root_meta.is_dir() {
            return Err(BackstopError::ScanRootNotDirectory(self.root.clone()));
        }

        let mut snapshot = Snapshot::new(&self.root);
        let walker = WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| {
                if entry.depth() == 0 {
                    return true;
                }
                if entry.file_type().is_dir()
                    && self.excluded_dirs.iter().any(|dir| dir == entry.path())
                {
                    trace!("Pruning excluded directory {:?}", entry.path());
                    return false;
                }
                match utils::relative_key(entry.path(), &self.root) {
                    Some(key) => !is_ignored(ignore.as_ref(), &key),
                    None => true,
                }
            });

        for entry in walker {
            let entry = entry.map_err(|e| walk_error(&self.root, e))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let metadata = entry
                .metadata()
                .map_err(|e| walk_error(entry.path(), e))?;
            let modified = metadata
                .modified()
                .map_err(|e| BackstopError::scan(entry.path(), e))?;
            let modified = utils::to_utc(modified).ok_or_else(|| {
                BackstopError::scan(
                    entry.path(),
                    io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("modification time {:?} is out of range", modified),
                    ),
                )
            })?;
            let relative_path = utils::relative_key(entry.path(), &self.root).ok_or_else(|| {
                BackstopError::internal(format!(
                    "{:?} is not below scan root {:?}",
                    entry.path(),
                    self.root
                ))
            })?;

            snapshot.insert(FileRecord {
                relative_path,
                modified,
                size: metadata.len(),
            });
        }

        debug!(
            "Scanned {:?}: {} files ({}) in {:?}",
            self.root,
            snapshot.len(),
            utils::format_bytes(snapshot.total_size()),
            start.elapsed()
        );

        Ok(snapshot)
    }
}

/// Compile ignore patterns into a single glob set
fn build_ignore_set(patterns: &[String]) -> Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }

    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        for expanded in expand_pattern(pattern) {
            let glob = GlobBuilder::new(&expanded)
                .literal_separator(true)
                .build()
                .map_err(|e| BackstopError::InvalidPattern(format!("{}: {}", pattern, e)))?;
            builder.add(glob);
        }
    }

    builder
        .build()
        .map(Some)
        .map_err(|e| BackstopError::InvalidPattern(e.to_string()))
}

/// Translate one gitignore-style pattern into globset globs
fn expand_pattern(pattern: &str) -> Vec<String> {
    let trimmed = pattern.trim();
    let anchored = trimmed.starts_with('/');
    let body = trimmed.trim_start_matches('/').trim_end_matches('/');
    if body.is_empty() {
        return Vec::new();
    }

    let base = if anchored || body.contains('/') {
        body.to_string()
    } else {
        format!("**/{}", body)
    };

    vec![base.clone(), format!("{}/**", base)]
}

fn is_ignored(ignore: Option<&GlobSet>, relative: &Path) -> bool {
    ignore.is_some_and(|set| set.is_match(utils::display_key(relative)))
}

/// Turn a walkdir failure into a scan error naming the failing path
fn walk_error(fallback: &Path, err: walkdir::Error) -> BackstopError {
    let path = err
        .path()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| fallback.to_path_buf());
    let source = err
        .into_io_error()
        .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "directory walk failed"));
    BackstopError::scan(path, source)
}

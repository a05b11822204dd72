//! Utility functions for Backstop
//!
//! ## Categories of Utilities
//!
//! ### Path Manipulation
//! - Separator-neutral relative keys for snapshot records
//! - Pruning of empty directories left behind by tombstoned files
//!
//! ### File Operations
//! - Idempotent directory creation that tolerates concurrent creators
//! - Crash-safe copy (temp file in the destination directory, fsync, rename)
//!
//! ### Formatting
//! - Human-readable byte counts for the CLI
//!
//! All functions are thread-safe and are called concurrently by the executor's
//! workers.

use chrono::{DateTime, Utc};
use filetime::FileTime;
use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tempfile::NamedTempFile;
use tracing::trace;

/// Build the snapshot key for `path` below `root`
///
/// Only normal components are kept, which gives the same key for
/// `a/b.txt` and `a\b.txt` on platforms that accept both separators.
/// Returns `None` if `path` is not below `root`.
pub fn relative_key(path: &Path, root: &Path) -> Option<PathBuf> {
    let stripped = path.strip_prefix(root).ok()?;
    let key: PathBuf = stripped
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect();
    Some(key)
}

/// Render a relative key with forward slashes for logs and reports
pub fn display_key(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Convert a filesystem timestamp to UTC
///
/// Returns `None` for timestamps outside the range chrono can represent;
/// some filesystems store modification times far beyond it.
pub fn to_utc(time: SystemTime) -> Option<DateTime<Utc>> {
    match time.duration_since(UNIX_EPOCH) {
        Ok(after) => {
            let secs = i64::try_from(after.as_secs()).ok()?;
            DateTime::from_timestamp(secs, after.subsec_nanos())
        }
        Err(before) => {
            let before = before.duration();
            let secs = i64::try_from(before.as_secs()).ok()?;
            match before.subsec_nanos() {
                0 => DateTime::from_timestamp(-secs, 0),
                nanos => {
                    let secs = (-secs).checked_sub(1)?;
                    DateTime::from_timestamp(secs, 1_000_000_000 - nanos)
                }
            }
        }
    }
}

/// Create `path` and all of its ancestors
///
/// Several workers may create the same ancestor at once; a directory that
/// already exists is success. Anything else already at `path` is an error.
pub fn ensure_dir(path: &Path) -> io::Result<()> {
    match fs::create_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists && path.is_dir() => Ok(()),
        Err(e) => Err(e),
    }
}

/// Copy `source` to `destination` without ever exposing a partial file
///
/// The content is written to a temporary file next to `destination`, synced
/// to disk, given the source's permissions (and modification time when
/// `preserve_mtime` is set), then renamed over `destination`. The parent
/// directory of `destination` must already exist.
///
/// Returns the number of bytes copied.
pub fn copy_atomic(source: &Path, destination: &Path, preserve_mtime: bool) -> io::Result<u64> {
    let parent = destination.parent().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{:?} has no parent directory", destination),
        )
    })?;

    let mut reader = File::open(source)?;
    let source_meta = reader.metadata()?;

    let mut temp = NamedTempFile::new_in(parent)?;
    let bytes = io::copy(&mut reader, temp.as_file_mut())?;
    temp.as_file().sync_all()?;

    fs::set_permissions(temp.path(), source_meta.permissions())?;
    if preserve_mtime {
        let mtime = FileTime::from_last_modification_time(&source_meta);
        filetime::set_file_mtime(temp.path(), mtime)?;
    }

    temp.persist(destination).map_err(|e| e.error)?;
    trace!("Copied {:?} -> {:?} ({} bytes)", source, destination, bytes);
    Ok(bytes)
}

/// Remove directory if empty
pub fn remove_dir_if_empty(path: &Path) -> io::Result<bool> {
    if path.is_dir() && fs::read_dir(path)?.next().is_none() {
        fs::remove_dir(path)?;
        trace!("Removed empty directory: {:?}", path);
        Ok(true)
    } else {
        Ok(false)
    }
}

/// Remove the empty ancestors of `file`, stopping below `root`
///
/// Walks upward from the parent of `file` and stops at the first directory
/// that is not empty or cannot be removed. `root` itself is never removed.
/// Returns the number of directories removed.
pub fn prune_empty_parents(file: &Path, root: &Path) -> usize {
    let mut removed = 0;
    let mut current = file.parent();

    while let Some(dir) = current {
        if dir == root || !dir.starts_with(root) {
            break;
        }
        match remove_dir_if_empty(dir) {
            Ok(true) => removed += 1,
            Ok(false) => break,
            Err(e) => {
                trace!("Could not remove directory {:?}: {}", dir, e);
                break;
            }
        }
        current = dir.parent();
    }

    removed
}

/// Format bytes in human-readable form
///
/// Uses binary units (1024-based).
///
/// ```rust,ignore
/// assert_eq!(format_bytes(1536), "1.50 KB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", size as u64, UNITS[unit_idx])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

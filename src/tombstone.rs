//! Naming of tombstoned files
//!
//! A tombstone keeps the relative directory layout of the file it replaces
//! and appends a UTC instant with nanosecond precision:
//!
//! ```text
//! <tombstone_root>/docs/report.pdf.20261019T093015.123456789Z
//! ```
//!
//! If that name is already taken (two relocations inside one clock tick, or a
//! clock that moved backwards), [`TombstoneNamer::reserve`] appends `-1`,
//! `-2`, ... until it finds a free name. [`TombstoneNamer::claim`] does the
//! same but takes the name with an exclusive create, so concurrent writers
//! (even separate processes) never end up with the same target. Nothing in
//! the tombstone area is ever overwritten.

use chrono::{DateTime, Utc};
use std::ffi::OsString;
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};

/// Format of the instant appended to tombstoned names
const STAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.9fZ";

/// Compute the tombstone path for `relative` at instant `now`
///
/// Pure and total: performs no I/O and accepts any relative path.
pub fn name_for(relative: &Path, tombstone_root: &Path, now: DateTime<Utc>) -> PathBuf {
    with_suffix(&tombstone_root.join(relative), &format!(".{}", now.format(STAMP_FORMAT)))
}

/// Append `suffix` to the final component of `path`
fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

/// Tombstone name allocator bound to one tombstone root
#[derive(Debug, Clone)]
pub struct TombstoneNamer {
    root: PathBuf,
}

impl TombstoneNamer {
    /// Create a namer for `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Tombstone root this namer allocates under
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Pure candidate name; see [`name_for`]
    pub fn name_for(&self, relative: &Path, now: DateTime<Utc>) -> PathBuf {
        name_for(relative, &self.root, now)
    }

    /// First name derived from [`name_for`] that does not exist yet
    ///
    /// Existence is checked without following symbolic links, so a dangling
    /// link also counts as taken.
    pub fn reserve(&self, relative: &Path, now: DateTime<Utc>) -> PathBuf {
        let candidate = self.name_for(relative, now);
        if !exists(&candidate) {
            return candidate;
        }

        let mut counter: u64 = 1;
        loop {
            let next = with_suffix(&candidate, &format!("-{}", counter));
            if !exists(&next) {
                return next;
            }
            counter += 1;
        }
    }

    /// Take the first free name derived from [`name_for`]
    ///
    /// Each candidate is created as an empty placeholder with `create_new`,
    /// which fails with `AlreadyExists` instead of touching a prior
    /// tombstone. The caller renames the tombstoned file over the returned
    /// placeholder. The parent directory must already exist.
    pub fn claim(&self, relative: &Path, now: DateTime<Utc>) -> io::Result<PathBuf> {
        let candidate = self.name_for(relative, now);
        let mut counter: u64 = 0;
        loop {
            let next = match counter {
                0 => candidate.clone(),
                n => with_suffix(&candidate, &format!("-{}", n)),
            };
            match OpenOptions::new().write(true).create_new(true).open(&next) {
                Ok(_) => return Ok(next),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => counter += 1,
                Err(e) => return Err(e),
            }
        }
    }
}

fn exists(path: &Path) -> bool {
    path.symlink_metadata().is_ok()
}

//! Core data types used throughout the Backstop library
//!
//! ## Overview
//!
//! The types in this module represent:
//! - **Tree State**: [`FileRecord`], [`Snapshot`] - regular files of one tree at one instant
//! - **Decisions**: [`Action`], [`Plan`] - what a sync cycle is going to do
//! - **Results**: [`SyncReport`] - what a sync cycle did, including per-file failures
//! - **Progress**: [`ProgressInfo`], [`ProgressCallback`] - feedback during execution
//!
//! ## Examples
//!
//! ```rust
//! use backstop::types::{Action, Plan};
//! use std::path::PathBuf;
//!
//! let plan = Plan::from_actions(vec![
//!     Action::Copy { path: PathBuf::from("notes/a.txt") },
//!     Action::Tombstone { path: PathBuf::from("old.txt") },
//! ]);
//!
//! assert_eq!(plan.len(), 2);
//! assert_eq!(plan.counts().copies, 1);
//! assert_eq!(plan.counts().tombstones, 1);
//! ```

use crate::error::ActionError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Metadata of one regular file, keyed by its path relative to the tree root
///
/// # Examples
///
/// ```rust
/// # use backstop::types::FileRecord;
/// # use std::path::PathBuf;
/// # use chrono::Utc;
/// let record = FileRecord {
///     relative_path: PathBuf::from("src/main.rs"),
///     modified: Utc::now(),
///     size: 1024,
/// };
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileRecord {
    /// Path relative to the scanned root
    pub relative_path: PathBuf,
    /// Last modified timestamp
    pub modified: DateTime<Utc>,
    /// File size in bytes
    pub size: u64,
}

impl FileRecord {
    /// Check whether this (source) record should replace `backup`
    ///
    /// A newer timestamp or any size difference counts as a modification.
    /// Same-size edits that keep an equal or older timestamp go unnoticed.
    pub fn supersedes(&self, backup: &FileRecord) -> bool {
        self.modified > backup.modified || self.size != backup.size
    }
}

/// Regular-file state of one tree at one instant
///
/// Keys are relative paths built from normal path components, so two
/// snapshots of differently rooted trees compare by identical keys.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    /// Root the snapshot was taken from
    pub root: PathBuf,
    files: BTreeMap<PathBuf, FileRecord>,
    total_size: u64,
}

impl Snapshot {
    /// Create an empty snapshot for `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            files: BTreeMap::new(),
            total_size: 0,
        }
    }

    /// Insert a record, replacing any previous record with the same path
    pub fn insert(&mut self, record: FileRecord) {
        self.total_size += record.size;
        if let Some(previous) = self.files.insert(record.relative_path.clone(), record) {
            self.total_size -= previous.size;
        }
    }

    /// Look up a record by relative path
    pub fn get(&self, relative_path: &Path) -> Option<&FileRecord> {
        self.files.get(relative_path)
    }

    /// Check whether a relative path is present
    pub fn contains(&self, relative_path: &Path) -> bool {
        self.files.contains_key(relative_path)
    }

    /// Number of files in the snapshot
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Check whether the snapshot has no files
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Total size of all files in bytes
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Iterate records in relative path order
    pub fn iter(&self) -> impl Iterator<Item = &FileRecord> {
        self.files.values()
    }
}

impl FromIterator<FileRecord> for Snapshot {
    fn from_iter<I: IntoIterator<Item = FileRecord>>(iter: I) -> Self {
        let mut snapshot = Snapshot::default();
        for record in iter {
            snapshot.insert(record);
        }
        snapshot
    }
}

/// Kind of an [`Action`], without its path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    /// File exists in source, absent in backup
    Copy,
    /// File exists in both and the source copy is newer or differently sized
    Replace,
    /// File exists in backup, absent in source
    Tombstone,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::Copy => write!(f, "copy"),
            ActionKind::Replace => write!(f, "replace"),
            ActionKind::Tombstone => write!(f, "tombstone"),
        }
    }
}

/// One decision of a sync plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Action {
    /// Copy `source/path` to `backup/path`
    Copy {
        /// Relative path
        path: PathBuf,
    },
    /// Move `backup/path` to the tombstone area, then copy `source/path` over
    Replace {
        /// Relative path
        path: PathBuf,
    },
    /// Move `backup/path` to the tombstone area
    Tombstone {
        /// Relative path
        path: PathBuf,
    },
}

impl Action {
    /// Relative path this action is about
    pub fn path(&self) -> &Path {
        match self {
            Action::Copy { path } | Action::Replace { path } | Action::Tombstone { path } => path,
        }
    }

    /// Kind of this action
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Copy { .. } => ActionKind::Copy,
            Action::Replace { .. } => ActionKind::Replace,
            Action::Tombstone { .. } => ActionKind::Tombstone,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.path().display())
    }
}

/// Ordered sequence of actions produced by comparing two snapshots
///
/// No two actions in a plan share a relative path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    actions: Vec<Action>,
}

impl Plan {
    /// Build a plan from a list of actions
    pub fn from_actions(actions: Vec<Action>) -> Self {
        Self { actions }
    }

    /// Number of actions
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Check whether there is nothing to do
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Iterate actions in plan order
    pub fn iter(&self) -> std::slice::Iter<'_, Action> {
        self.actions.iter()
    }

    /// Actions as a slice
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Count actions by kind
    pub fn counts(&self) -> PlanCounts {
        let mut counts = PlanCounts::default();
        for action in &self.actions {
            match action.kind() {
                ActionKind::Copy => counts.copies += 1,
                ActionKind::Replace => counts.replaces += 1,
                ActionKind::Tombstone => counts.tombstones += 1,
            }
        }
        counts
    }
}

impl<'a> IntoIterator for &'a Plan {
    type Item = &'a Action;
    type IntoIter = std::slice::Iter<'a, Action>;

    fn into_iter(self) -> Self::IntoIter {
        self.actions.iter()
    }
}

/// Number of actions of each kind in a [`Plan`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanCounts {
    /// Number of `Copy` actions
    pub copies: usize,
    /// Number of `Replace` actions
    pub replaces: usize,
    /// Number of `Tombstone` actions
    pub tombstones: usize,
}

/// Result of one sync cycle
///
/// Workers each accumulate a local report; [`SyncReport::merge`] combines
/// them once a phase has finished.
///
/// # Examples
///
/// ```rust
/// # use backstop::types::SyncReport;
/// let mut first = SyncReport::default();
/// first.copied = 2;
/// let mut second = SyncReport::default();
/// second.tombstoned = 1;
///
/// let merged = first.merge(second);
/// assert_eq!(merged.total_operations(), 3);
/// assert!(merged.is_clean());
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncReport {
    /// Files copied into the backup for the first time
    pub copied: usize,
    /// Files whose backup copy was tombstoned and refreshed
    pub replaced: usize,
    /// Files moved from the backup into the tombstone area
    pub tombstoned: usize,
    /// Bytes written into the backup tree
    pub bytes_copied: u64,
    /// Regular files seen in the source scan
    pub source_files: usize,
    /// Regular files seen in the backup scan
    pub backup_files: usize,
    /// Time taken for the cycle in milliseconds
    pub duration_ms: u64,
    /// Per-file failures, sorted by path
    pub errors: Vec<ActionError>,
}

impl SyncReport {
    /// Combine two partial reports
    pub fn merge(mut self, other: SyncReport) -> SyncReport {
        self.copied += other.copied;
        self.replaced += other.replaced;
        self.tombstoned += other.tombstoned;
        self.bytes_copied += other.bytes_copied;
        self.source_files += other.source_files;
        self.backup_files += other.backup_files;
        self.duration_ms = self.duration_ms.max(other.duration_ms);
        self.errors.extend(other.errors);
        self
    }

    /// Number of successful actions
    pub fn total_operations(&self) -> usize {
        self.copied + self.replaced + self.tombstoned
    }

    /// Check whether every action succeeded
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Progress callback for long-running operations
pub type ProgressCallback = Arc<dyn Fn(ProgressInfo) + Send + Sync>;

/// Information passed to progress callbacks
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// Operation being performed
    pub operation: String,
    /// Current item being processed
    pub current_item: Option<String>,
    /// Items processed so far
    pub processed: usize,
    /// Total items to process (if known)
    pub total: Option<usize>,
}

impl ProgressInfo {
    /// Get progress as a percentage (0-100)
    pub fn percentage(&self) -> Option<f32> {
        match self.total {
            Some(total) if total > 0 => Some((self.processed as f32 / total as f32) * 100.0),
            _ => None,
        }
    }
}

//! Plan execution against the filesystem
//!
//! [`ActionExecutor`] applies the actions of a [`Plan`] with a bounded rayon
//! worker pool and collects every per-file failure into the returned
//! [`SyncReport`].
//!
//! ## Action semantics
//!
//! - **Copy**: create the parent directory in the backup tree, then copy the
//!   source file into place through a temporary file and a rename. If the
//!   copy fails, parent directories left empty are removed again.
//! - **Replace**: move the current backup copy into the tombstone area, then
//!   copy the source file into place. If the move fails the copy is skipped,
//!   so the old version is never lost. If the copy fails the backup lacks the
//!   file until the next cycle plans a fresh `Copy`.
//! - **Tombstone**: move the backup copy into the tombstone area, then remove
//!   any parent directories that became empty.
//!
//! Relocation targets are claimed with an exclusive create before the
//! rename (see [`TombstoneNamer::claim`]), so overlapping runs on the same
//! roots cannot rename over each other's tombstones.
//!
//! Nothing is ever unlinked; the only destructive filesystem calls are
//! renames into the tombstone area and removal of empty directories.
//!
//! ## Ordering
//!
//! Execution runs in two phases separated by a barrier: every `Tombstone`
//! first, then every `Copy` and `Replace`. Within a phase actions run in any
//! order. Clearing out removed files first lets a path that turned from a
//! directory into a file (or the reverse) settle within a single cycle.

use crate::error::{ActionError, ActionStage, BackstopError, Result};
use crate::tombstone::TombstoneNamer;
use crate::types::{Action, ActionKind, Plan, ProgressCallback, ProgressInfo, SyncReport};
use crate::utils;
use chrono::Utc;
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, trace, warn};

/// Successful outcome of one action
#[derive(Debug, Clone, Copy)]
struct Applied {
    kind: ActionKind,
    bytes: u64,
}

/// Applies plans to a backup tree
pub struct ActionExecutor {
    source_root: PathBuf,
    backup_root: PathBuf,
    namer: TombstoneNamer,
    concurrency: usize,
    preserve_mtime: bool,
    progress_callback: Option<ProgressCallback>,
}

impl std::fmt::Debug for ActionExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionExecutor")
            .field("source_root", &self.source_root)
            .field("backup_root", &self.backup_root)
            .field("tombstone_root", &self.namer.root())
            .field("concurrency", &self.concurrency)
            .field("preserve_mtime", &self.preserve_mtime)
            .field("progress_callback", &self.progress_callback.is_some())
            .finish()
    }
}

impl ActionExecutor {
    /// Create an executor with one worker per CPU
    pub fn new(
        source_root: impl Into<PathBuf>,
        backup_root: impl Into<PathBuf>,
        tombstone_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source_root: source_root.into(),
            backup_root: backup_root.into(),
            namer: TombstoneNamer::new(tombstone_root),
            concurrency: num_cpus::get(),
            preserve_mtime: true,
            progress_callback: None,
        }
    }

    /// Set the number of worker threads (minimum 1)
    pub fn with_concurrency(mut self, workers: usize) -> Self {
        self.concurrency = workers.max(1);
        self
    }

    /// Set whether backup copies take the source's modification time
    pub fn with_preserve_mtime(mut self, preserve: bool) -> Self {
        self.preserve_mtime = preserve;
        self
    }

    /// Set a callback invoked after every finished action
    pub fn with_progress_callback(mut self, callback: Option<ProgressCallback>) -> Self {
        self.progress_callback = callback;
        self
    }

    /// Apply every action of `plan`
    ///
    /// Per-file failures end up in [`SyncReport::errors`], sorted by path;
    /// they never stop the remaining actions.
    ///
    /// # Errors
    ///
    /// - [`BackstopError::ThreadPool`] if the worker pool cannot be started
    pub fn execute(&self, plan: &Plan) -> Result<SyncReport> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.concurrency)
            .thread_name(|i| format!("backstop-worker-{}", i))
            .build()
            .map_err(|e| BackstopError::ThreadPool(e.to_string()))?;

        let (tombstones, transfers): (Vec<&Action>, Vec<&Action>) = plan
            .iter()
            .partition(|action| action.kind() == ActionKind::Tombstone);

        debug!(
            "Executing {} tombstones then {} transfers on {} workers",
            tombstones.len(),
            transfers.len(),
            self.concurrency
        );

        let processed = AtomicUsize::new(0);
        let total = plan.len();
        let mut report = pool.install(|| {
            let removed = self.run_phase(&tombstones, &processed, total);
            let transferred = self.run_phase(&transfers, &processed, total);
            removed.merge(transferred)
        });

        report.errors.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(report)
    }

    /// Run one phase in parallel, folding into per-worker reports
    fn run_phase(&self, actions: &[&Action], processed: &AtomicUsize, total: usize) -> SyncReport {
        actions
            .par_iter()
            .fold(SyncReport::default, |mut report, action| {
                match self.apply(action) {
                    Ok(applied) => {
                        match applied.kind {
                            ActionKind::Copy => report.copied += 1,
                            ActionKind::Replace => report.replaced += 1,
                            ActionKind::Tombstone => report.tombstoned += 1,
                        }
                        report.bytes_copied += applied.bytes;
                    }
                    Err(err) => {
                        warn!("{}", err);
                        report.errors.push(err);
                    }
                }

                let done = processed.fetch_add(1, Ordering::Relaxed) + 1;
                if let Some(callback) = &self.progress_callback {
                    callback(ProgressInfo {
                        operation: "Syncing".to_string(),
                        current_item: Some(utils::display_key(action.path())),
                        processed: done,
                        total: Some(total),
                    });
                }

                report
            })
            .reduce(SyncReport::default, SyncReport::merge)
    }

    /// Apply a single action
    fn apply(&self, action: &Action) -> std::result::Result<Applied, ActionError> {
        trace!("Applying {}", action);
        match action {
            Action::Copy { path } => {
                let bytes = self.copy_in(path, ActionKind::Copy)?;
                Ok(Applied { kind: ActionKind::Copy, bytes })
            }
            Action::Replace { path } => {
                self.relocate(path, ActionKind::Replace)?;
                let bytes = self.copy_in(path, ActionKind::Replace)?;
                Ok(Applied { kind: ActionKind::Replace, bytes })
            }
            Action::Tombstone { path } => {
                self.relocate(path, ActionKind::Tombstone)?;
                let pruned =
                    utils::prune_empty_parents(&self.backup_root.join(path), &self.backup_root);
                if pruned > 0 {
                    trace!("Pruned {} empty directories above {:?}", pruned, path);
                }
                Ok(Applied { kind: ActionKind::Tombstone, bytes: 0 })
            }
        }
    }

    /// Copy `source/relative` over `backup/relative`
    fn copy_in(&self, relative: &Path, kind: ActionKind) -> std::result::Result<u64, ActionError> {
        let source = self.source_root.join(relative);
        let destination = self.backup_root.join(relative);

        if let Some(parent) = destination.parent() {
            utils::ensure_dir(parent)
                .map_err(|e| ActionError::from_io(relative, kind, ActionStage::CreateDir, &e))?;
        }

        utils::copy_atomic(&source, &destination, self.preserve_mtime).map_err(|e| {
            // No empty directories from a failed attempt stay in the backup
            let pruned = utils::prune_empty_parents(&destination, &self.backup_root);
            if pruned > 0 {
                trace!("Removed {} empty directories after failed copy of {:?}", pruned, relative);
            }
            ActionError::from_io(relative, kind, ActionStage::Copy, &e)
        })
    }

    /// Move `backup/relative` into the tombstone area
    fn relocate(
        &self,
        relative: &Path,
        kind: ActionKind,
    ) -> std::result::Result<PathBuf, ActionError> {
        let current = self.backup_root.join(relative);
        let now = Utc::now();

        if let Some(parent) = self.namer.name_for(relative, now).parent() {
            utils::ensure_dir(parent)
                .map_err(|e| ActionError::from_io(relative, kind, ActionStage::CreateDir, &e))?;
        }

        let target = self
            .namer
            .claim(relative, now)
            .map_err(|e| ActionError::from_io(relative, kind, ActionStage::Relocate, &e))?;
        if let Err(e) = fs::rename(&current, &target) {
            // Only the empty placeholder we just created is removed here
            if let Err(cleanup) = fs::remove_file(&target) {
                warn!("Could not remove unused tombstone name {:?}: {}", target, cleanup);
            }
            return Err(ActionError::from_io(relative, kind, ActionStage::Relocate, &e));
        }
        trace!("Tombstoned {:?} -> {:?}", current, target);
        Ok(target)
    }
}

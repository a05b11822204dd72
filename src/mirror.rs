//! Sync orchestration
//!
//! [`Mirror`] ties the pieces of one sync cycle together:
//!
//! 1. create the backup and tombstone roots if needed
//! 2. scan the source tree and the backup tree
//! 3. compute a [`Plan`] from the two snapshots
//! 4. execute the plan with a bounded worker pool
//!
//! Structural failures (a tree that cannot be scanned, a root that cannot be
//! created) fail the call. Per-file failures are reported in
//! [`SyncReport::errors`] and retried naturally by the next cycle, because
//! every cycle recomputes its plan from the filesystem as it is.
//!
//! ## Examples
//!
//! ```rust,no_run
//! use backstop::MirrorBuilder;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mirror = MirrorBuilder::new()
//!     .parallel_workers(4)
//!     .ignore_patterns(vec!["*.tmp".to_string()])
//!     .build("/data/misc", "/backup/misc", "/backup/deleted");
//!
//! // Preview without touching anything
//! let plan = mirror.plan()?;
//! println!("{} actions pending", plan.len());
//!
//! let report = mirror.sync()?;
//! println!("copied {}, replaced {}, tombstoned {}",
//!     report.copied, report.replaced, report.tombstoned);
//! for error in &report.errors {
//!     eprintln!("  {}", error);
//! }
//! # Ok(())
//! # }
//! ```

use crate::config::MirrorConfig;
use crate::diff::compute_plan;
use crate::error::{BackstopError, Result};
use crate::executor::ActionExecutor;
use crate::scanner::TreeScanner;
use crate::types::{Plan, ProgressCallback, SyncReport};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, instrument};

/// Resolved roots of one cycle
#[derive(Debug)]
struct Roots {
    source: PathBuf,
    backup: PathBuf,
    tombstone: PathBuf,
}

/// One source tree mirrored into a backup tree with a tombstone area
pub struct Mirror {
    source_root: PathBuf,
    backup_root: PathBuf,
    tombstone_root: PathBuf,
    parallel_workers: usize,
    ignore_patterns: Vec<String>,
    preserve_mtime: bool,
    progress_callback: Option<ProgressCallback>,
}

impl std::fmt::Debug for Mirror {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mirror")
            .field("source_root", &self.source_root)
            .field("backup_root", &self.backup_root)
            .field("tombstone_root", &self.tombstone_root)
            .field("parallel_workers", &self.parallel_workers)
            .field("ignore_patterns", &self.ignore_patterns)
            .field("preserve_mtime", &self.preserve_mtime)
            .field("progress_callback", &self.progress_callback.is_some())
            .finish()
    }
}

impl Mirror {
    /// Build a mirror from a validated configuration
    pub fn from_config(config: &MirrorConfig) -> Result<Self> {
        config.validate()?;
        Ok(MirrorBuilder::new()
            .parallel_workers(config.parallel_workers)
            .ignore_patterns(config.ignore_patterns.clone())
            .preserve_mtime(config.preserve_mtime)
            .build(
                config.source_root.clone(),
                config.backup_root.clone(),
                config.tombstone_root.clone(),
            ))
    }

    /// Directory being backed up
    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    /// Mirror of the source tree
    pub fn backup_root(&self) -> &Path {
        &self.backup_root
    }

    /// Tombstone area
    pub fn tombstone_root(&self) -> &Path {
        &self.tombstone_root
    }

    /// Run one sync cycle
    ///
    /// # Errors
    ///
    /// - [`BackstopError::Setup`] if the backup or tombstone root cannot be created
    /// - [`BackstopError::InvalidConfiguration`] if two roots are the same directory,
    ///   or the source lies inside the backup or tombstone root
    /// - [`BackstopError::Scan`] if either tree cannot be scanned
    /// - [`BackstopError::ThreadPool`] if the worker pool cannot be started
    ///
    /// Failures of individual files are not errors; see [`SyncReport::errors`].
    #[instrument(skip(self), fields(source = ?self.source_root))]
    pub fn sync(&self) -> Result<SyncReport> {
        let start = Instant::now();
        info!("Starting sync of {:?} into {:?}", self.source_root, self.backup_root);

        let roots = self.prepare()?;
        let (plan, source_files, backup_files) = self.scan_and_plan(&roots)?;

        let executor = ActionExecutor::new(&roots.source, &roots.backup, &roots.tombstone)
            .with_concurrency(self.parallel_workers)
            .with_preserve_mtime(self.preserve_mtime)
            .with_progress_callback(self.progress_callback.clone());
        let mut report = executor.execute(&plan)?;

        report.source_files = source_files;
        report.backup_files = backup_files;
        report.duration_ms = start.elapsed().as_millis() as u64;

        info!(
            "Sync finished in {}ms: {} copied, {} replaced, {} tombstoned, {} failed",
            report.duration_ms,
            report.copied,
            report.replaced,
            report.tombstoned,
            report.errors.len()
        );

        Ok(report)
    }

    /// Compute the plan of the next cycle without executing it
    ///
    /// The backup and tombstone roots are still created if missing, so that
    /// an empty backup tree can be scanned.
    #[instrument(skip(self), fields(source = ?self.source_root))]
    pub fn plan(&self) -> Result<Plan> {
        let roots = self.prepare()?;
        let (plan, _, _) = self.scan_and_plan(&roots)?;
        Ok(plan)
    }

    /// Create the backup and tombstone roots and resolve all three roots
    fn prepare(&self) -> Result<Roots> {
        for root in [&self.backup_root, &self.tombstone_root] {
            crate::utils::ensure_dir(root).map_err(|e| BackstopError::setup(root, e))?;
        }

        let source = self
            .source_root
            .canonicalize()
            .map_err(|e| BackstopError::scan(&self.source_root, e))?;
        let backup = self
            .backup_root
            .canonicalize()
            .map_err(|e| BackstopError::setup(&self.backup_root, e))?;
        let tombstone = self
            .tombstone_root
            .canonicalize()
            .map_err(|e| BackstopError::setup(&self.tombstone_root, e))?;

        if source == backup || source == tombstone || backup == tombstone {
            return Err(BackstopError::invalid_config(format!(
                "source {:?}, backup {:?} and tombstone {:?} must be different directories",
                source, backup, tombstone
            )));
        }
        // Backup and tombstone roots may sit inside the source (they are
        // excluded from its scan), never the other way around
        for (inner, outer) in [(&source, &backup), (&source, &tombstone), (&backup, &tombstone)] {
            if inner.starts_with(outer) {
                return Err(BackstopError::invalid_config(format!(
                    "{:?} must not be inside {:?}",
                    inner, outer
                )));
            }
        }

        Ok(Roots { source, backup, tombstone })
    }

    /// Scan both trees and diff them
    fn scan_and_plan(&self, roots: &Roots) -> Result<(Plan, usize, usize)> {
        let source_snapshot = TreeScanner::new(&roots.source)
            .with_ignore_patterns(self.ignore_patterns.clone())
            .with_excluded_dirs(nested_in(&roots.source, [&roots.backup, &roots.tombstone]))
            .scan()?;
        let backup_snapshot = TreeScanner::new(&roots.backup)
            .with_ignore_patterns(self.ignore_patterns.clone())
            .with_excluded_dirs(nested_in(&roots.backup, [&roots.tombstone]))
            .scan()?;

        let plan = compute_plan(&source_snapshot, &backup_snapshot);
        debug!("Plan has {} actions", plan.len());
        Ok((plan, source_snapshot.len(), backup_snapshot.len()))
    }
}

/// Directories among `candidates` that lie inside `root`
fn nested_in<'a>(root: &Path, candidates: impl IntoIterator<Item = &'a PathBuf>) -> Vec<PathBuf> {
    candidates
        .into_iter()
        .filter(|dir| dir.starts_with(root))
        .cloned()
        .collect()
}

/// Builder for [`Mirror`]
///
/// # Default Values
///
/// - `parallel_workers`: Number of CPU cores
/// - `ignore_patterns`: Empty
/// - `preserve_mtime`: true
/// - `progress_callback`: None
pub struct MirrorBuilder {
    parallel_workers: usize,
    ignore_patterns: Vec<String>,
    preserve_mtime: bool,
    progress_callback: Option<ProgressCallback>,
}

impl MirrorBuilder {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self {
            parallel_workers: num_cpus::get(),
            ignore_patterns: Vec::new(),
            preserve_mtime: true,
            progress_callback: None,
        }
    }

    /// Set number of parallel workers (minimum 1)
    pub fn parallel_workers(mut self, count: usize) -> Self {
        self.parallel_workers = count.max(1);
        self
    }

    /// Set ignore patterns
    ///
    /// Patterns apply to both trees, so an ignored file is neither copied
    /// from the source nor tombstoned from the backup.
    pub fn ignore_patterns(mut self, patterns: Vec<String>) -> Self {
        self.ignore_patterns = patterns;
        self
    }

    /// Set whether backup copies take the source's modification time
    pub fn preserve_mtime(mut self, preserve: bool) -> Self {
        self.preserve_mtime = preserve;
        self
    }

    /// Set a progress callback invoked after every executed action
    pub fn progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Build the mirror
    ///
    /// Nothing is touched on disk until [`Mirror::sync`] or [`Mirror::plan`].
    pub fn build(
        self,
        source_root: impl Into<PathBuf>,
        backup_root: impl Into<PathBuf>,
        tombstone_root: impl Into<PathBuf>,
    ) -> Mirror {
        Mirror {
            source_root: source_root.into(),
            backup_root: backup_root.into(),
            tombstone_root: tombstone_root.into(),
            parallel_workers: self.parallel_workers,
            ignore_patterns: self.ignore_patterns,
            preserve_mtime: self.preserve_mtime,
            progress_callback: self.progress_callback,
        }
    }
}

impl Default for MirrorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

//! # Backstop - mirroring that never deletes
//!
//! An incremental, crash-tolerant directory mirroring engine. Given a source
//! tree and a backup tree, Backstop finds files that are new, modified or
//! removed in the source and applies the smallest set of copies and moves
//! that brings the backup in line. Files removed from the source, and backup
//! copies that are about to be overwritten, are moved into a tombstone area
//! and kept there indefinitely.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let report = backstop::sync("/data/misc", "/backup/misc", "/backup/deleted")?;
//! println!(
//!     "copied {}, replaced {}, tombstoned {}, failed {}",
//!     report.copied,
//!     report.replaced,
//!     report.tombstoned,
//!     report.errors.len()
//! );
//! # Ok(())
//! # }
//! ```
//!
//! ## How a cycle works
//!
//! 1. **Scan** ([`scanner`]): both trees are walked and every regular file is
//!    recorded with its size and modification time.
//! 2. **Diff** ([`diff`]): the two snapshots are compared. New files become
//!    `Copy`, files that are newer or differently sized become `Replace`,
//!    files that vanished from the source become `Tombstone`.
//! 3. **Execute** ([`executor`]): a bounded worker pool applies the plan. A
//!    `Replace` always moves the old backup copy away before the new one is
//!    copied in, and copies land through a temporary file and a rename, so a
//!    crash at any point loses nothing.
//!
//! Nothing is carried over between cycles. Every cycle re-derives its plan
//! from the filesystem, so a file that failed in one cycle is simply planned
//! again in the next.
//!
//! ## Change detection
//!
//! A file counts as modified when its source copy is newer than the backup
//! copy or has a different size. Content is never hashed, so an edit that
//! keeps both the size and an equal or older timestamp goes unnoticed.
//!
//! ## Error Handling
//!
//! Operations that can fail structurally return `Result<T, BackstopError>`:
//! a tree that cannot be scanned or a root that cannot be created aborts the
//! cycle. Failures of single files are collected in
//! [`SyncReport::errors`](types::SyncReport) and never stop the rest of the
//! tree from syncing.
//!
//! ## Module Organization
//!
//! - [`scanner`]: directory walking and snapshots
//! - [`diff`]: plan computation
//! - [`tombstone`]: collision-free tombstone names
//! - [`executor`]: parallel plan execution
//! - [`mirror`]: the sync cycle and its builder
//! - [`config`]: JSON configuration
//! - [`scheduler`]: periodic cycles with cooperative shutdown
//! - [`types`]: shared data structures
//! - [`error`]: error types

pub mod config;
pub mod diff;
pub mod error;
pub mod executor;
pub mod mirror;
pub mod scanner;
pub mod scheduler;
pub mod tombstone;
pub mod types;

// Internal modules (not part of public API)
mod utils;

pub use config::MirrorConfig;
pub use diff::compute_plan;
pub use error::{ActionError, ActionStage, BackstopError, Result};
pub use executor::ActionExecutor;
pub use mirror::{Mirror, MirrorBuilder};
pub use scanner::TreeScanner;
pub use tombstone::TombstoneNamer;
pub use types::*;

/// Human-readable byte count, as shown by the CLI
pub fn format_bytes(bytes: u64) -> String {
    utils::format_bytes(bytes)
}

/// Run one sync cycle with default settings
///
/// Equivalent to `MirrorBuilder::new().build(source, backup, tombstone).sync()`.
pub fn sync(
    source_root: impl Into<std::path::PathBuf>,
    backup_root: impl Into<std::path::PathBuf>,
    tombstone_root: impl Into<std::path::PathBuf>,
) -> Result<SyncReport> {
    MirrorBuilder::new()
        .build(source_root, backup_root, tombstone_root)
        .sync()
}

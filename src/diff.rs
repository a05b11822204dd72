//! Plan computation between a source and a backup snapshot
//!
//! [`compute_plan`] is a pure function: no I/O, and the same two snapshots
//! always give the same plan.
//!
//! ## Rules
//!
//! For every path in the source snapshot:
//! - absent from the backup → [`Action::Copy`]
//! - present, and the source is newer or a different size → [`Action::Replace`]
//! - otherwise the two copies are considered in sync
//!
//! For every path in the backup snapshot that the source lacks →
//! [`Action::Tombstone`].
//!
//! The size check exists because some filesystems report coarse or unreliable
//! modification times. A same-size overwrite with an equal or older timestamp
//! is not detected.
//!
//! ## Example
//!
//! ```rust
//! use backstop::diff::compute_plan;
//! use backstop::types::{Action, FileRecord, Snapshot};
//! use chrono::DateTime;
//! use std::path::PathBuf;
//!
//! let at = |secs| DateTime::from_timestamp(secs, 0).unwrap();
//! let source: Snapshot = vec![
//!     FileRecord { relative_path: PathBuf::from("a.txt"), modified: at(200), size: 12 },
//! ].into_iter().collect();
//! let backup: Snapshot = vec![
//!     FileRecord { relative_path: PathBuf::from("a.txt"), modified: at(100), size: 10 },
//!     FileRecord { relative_path: PathBuf::from("b.txt"), modified: at(100), size: 1 },
//! ].into_iter().collect();
//!
//! let plan = compute_plan(&source, &backup);
//! assert_eq!(plan.actions(), &[
//!     Action::Replace { path: PathBuf::from("a.txt") },
//!     Action::Tombstone { path: PathBuf::from("b.txt") },
//! ]);
//! ```

use crate::types::{Action, Plan, Snapshot};
use tracing::debug;

/// Compute the actions that bring `backup` in line with `source`
///
/// Copies and replaces come first in source path order, followed by
/// tombstones in backup path order.
pub fn compute_plan(source: &Snapshot, backup: &Snapshot) -> Plan {
    let mut actions = Vec::new();

    for record in source.iter() {
        match backup.get(&record.relative_path) {
            None => actions.push(Action::Copy {
                path: record.relative_path.clone(),
            }),
            Some(existing) if record.supersedes(existing) => actions.push(Action::Replace {
                path: record.relative_path.clone(),
            }),
            Some(_) => {}
        }
    }

    for record in backup.iter() {
        if !source.contains(&record.relative_path) {
            actions.push(Action::Tombstone {
                path: record.relative_path.clone(),
            });
        }
    }

    let plan = Plan::from_actions(actions);
    let counts = plan.counts();
    debug!(
        "Planned {} copies, {} replaces, {} tombstones ({} source files, {} backup files)",
        counts.copies,
        counts.replaces,
        counts.tombstones,
        source.len(),
        backup.len()
    );
    plan
}

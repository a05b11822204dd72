//! Property-based testing for Backstop
//!
//! Uses proptest to check the planning rules and tombstone naming across
//! randomly generated snapshots, and full sync cycles across randomly
//! generated trees.

use ::backstop::tombstone::{self, TombstoneNamer};
use ::backstop::*;
use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Generate random relative file paths
fn path_strategy() -> impl Strategy<Value = PathBuf> {
    let dir_strategy = prop::collection::vec("[a-d]{1,2}", 0..=3);
    let filename_strategy = prop_oneof![
        "file[0-9]{1,2}\\.txt",
        "[a-z]{1,6}\\.(txt|rs|md)",
    ];

    (dir_strategy, filename_strategy).prop_map(|(dirs, filename)| {
        let mut path = PathBuf::new();
        for dir in dirs {
            path.push(dir);
        }
        path.join(filename)
    })
}

/// Generate a snapshot with small timestamps and sizes, so that paths shared
/// between two snapshots hit every branch of the comparison
fn snapshot_strategy() -> impl Strategy<Value = Snapshot> {
    let files = prop::collection::btree_map(path_strategy(), (0i64..4, 0u64..4), 0..40);
    files.prop_map(|files| -> Snapshot {
        files
            .into_iter()
            .map(|(relative_path, (secs, size))| FileRecord {
                relative_path,
                modified: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
                size,
            })
            .collect()
    })
}

/// Snapshots that share most of their paths
fn snapshot_pair_strategy() -> impl Strategy<Value = (Snapshot, Snapshot)> {
    (snapshot_strategy(), snapshot_strategy(), any::<u64>()).prop_map(|(source, extra, seed)| {
        // The backup starts as a perturbed copy of the source plus some extra files
        let backup: Snapshot = source
            .iter()
            .enumerate()
            .filter(|(i, _)| (seed >> (i % 64)) & 1 == 0 || i % 3 != 0)
            .map(|(i, record)| {
                let mut record = record.clone();
                match seed.rotate_left(i as u32) % 4 {
                    0 => record.modified += chrono::Duration::seconds(1),
                    1 => record.modified -= chrono::Duration::seconds(1),
                    2 => record.size += 1,
                    _ => {}
                }
                record
            })
            .chain(extra.iter().cloned())
            .collect();
        (source, backup)
    })
}

fn keys(snapshot: &Snapshot) -> BTreeSet<PathBuf> {
    snapshot.iter().map(|r| r.relative_path.clone()).collect()
}

/// Apply a plan to a snapshot model of the backup
fn apply_to_model(plan: &Plan, source: &Snapshot, backup: &Snapshot) -> Snapshot {
    let mut files: BTreeMap<PathBuf, FileRecord> =
        backup.iter().map(|r| (r.relative_path.clone(), r.clone())).collect();
    for action in plan {
        match action {
            Action::Copy { path } | Action::Replace { path } => {
                files.insert(path.clone(), source.get(path).unwrap().clone());
            }
            Action::Tombstone { path } => {
                files.remove(path);
            }
        }
    }
    files.into_values().collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn prop_plan_partitions_paths((source, backup) in snapshot_pair_strategy()) {
        let plan = compute_plan(&source, &backup);
        let source_keys = keys(&source);
        let backup_keys = keys(&backup);

        let mut seen = BTreeSet::new();
        for action in &plan {
            prop_assert!(
                seen.insert(action.path().to_path_buf()),
                "two actions for {:?}",
                action.path()
            );
            match action {
                Action::Copy { path } => {
                    prop_assert!(source_keys.contains(path) && !backup_keys.contains(path));
                }
                Action::Replace { path } => {
                    let s = source.get(path).unwrap();
                    let b = backup.get(path).unwrap();
                    prop_assert!(s.modified > b.modified || s.size != b.size);
                }
                Action::Tombstone { path } => {
                    prop_assert!(backup_keys.contains(path) && !source_keys.contains(path));
                }
            }
        }

        let counts = plan.counts();
        prop_assert_eq!(counts.copies, source_keys.difference(&backup_keys).count());
        prop_assert_eq!(counts.tombstones, backup_keys.difference(&source_keys).count());
    }

    #[test]
    fn prop_unchanged_files_get_no_action((source, backup) in snapshot_pair_strategy()) {
        let plan = compute_plan(&source, &backup);
        let planned: BTreeSet<&Path> = plan.iter().map(|a| a.path()).collect();

        for record in source.iter() {
            if let Some(existing) = backup.get(&record.relative_path) {
                let changed = record.modified > existing.modified || record.size != existing.size;
                prop_assert_eq!(planned.contains(record.relative_path.as_path()), changed);
            }
        }
    }

    #[test]
    fn prop_transfers_precede_tombstones((source, backup) in snapshot_pair_strategy()) {
        let plan = compute_plan(&source, &backup);
        let first_tombstone = plan
            .iter()
            .position(|a| matches!(a, Action::Tombstone { .. }))
            .unwrap_or(plan.len());
        prop_assert!(plan.actions()[first_tombstone..]
            .iter()
            .all(|a| matches!(a, Action::Tombstone { .. })),
            "tombstone actions must come last");
    }

    #[test]
    fn prop_applied_plan_converges((source, backup) in snapshot_pair_strategy()) {
        let plan = compute_plan(&source, &backup);
        let result = apply_to_model(&plan, &source, &backup);

        prop_assert_eq!(keys(&result), keys(&source));
        prop_assert!(compute_plan(&source, &result).is_empty());
    }

    #[test]
    fn prop_plan_is_deterministic((source, backup) in snapshot_pair_strategy()) {
        prop_assert_eq!(compute_plan(&source, &backup), compute_plan(&source, &backup));
    }

    #[test]
    fn prop_tombstone_name_keeps_directory(
        path in path_strategy(),
        nanos in 0i64..1_000_000_000_000_000_000,
    ) {
        let now: DateTime<Utc> = Utc.timestamp_nanos(nanos);
        let name = tombstone::name_for(&path, Path::new("/tomb"), now);

        let expected = Path::new("/tomb").join(&path);
        prop_assert_eq!(name.parent(), expected.parent());
        let original = path.file_name().unwrap().to_string_lossy().into_owned();
        let file_name = name.file_name().unwrap().to_string_lossy().into_owned();
        prop_assert!(file_name.starts_with(&format!("{}.", original)),
            "tombstone name must start with original file name");
        prop_assert!(file_name.ends_with('Z'));
    }

    #[test]
    fn prop_tombstone_names_differ_across_instants(
        path in path_strategy(),
        a in 0i64..1_000_000_000_000_000_000,
        b in 0i64..1_000_000_000_000_000_000,
    ) {
        prop_assume!(a != b);
        let root = Path::new("/tomb");
        prop_assert_ne!(
            tombstone::name_for(&path, root, Utc.timestamp_nanos(a)),
            tombstone::name_for(&path, root, Utc.timestamp_nanos(b))
        );
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn prop_reserve_never_reuses_a_name(path in path_strategy(), count in 1usize..12) {
        let temp = TempDir::new().unwrap();
        let namer = TombstoneNamer::new(temp.path());
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();

        let mut names = BTreeSet::new();
        for _ in 0..count {
            let name = namer.reserve(&path, now);
            fs::create_dir_all(name.parent().unwrap()).unwrap();
            fs::write(&name, b"taken").unwrap();
            prop_assert!(names.insert(name));
        }
    }

    #[test]
    fn prop_sync_mirrors_random_trees(
        first in tree_strategy(1..15),
        second in tree_strategy(0..15),
    ) {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("source");
        let backup = temp.path().join("backup");
        let tombstones = temp.path().join("tombstones");
        fs::create_dir_all(&source).unwrap();
        let mirror = MirrorBuilder::new().parallel_workers(2).build(&source, &backup, &tombstones);

        for (round, files) in [&first, &second].into_iter().enumerate() {
            if source.exists() {
                fs::remove_dir_all(&source).unwrap();
            }
            fs::create_dir_all(&source).unwrap();
            let written = write_tree(&source, files, 1_700_000_000 + round as i64 * 100);

            let report = mirror.sync().unwrap();
            prop_assert!(report.is_clean(), "errors: {:?}", report.errors);
            prop_assert!(mirror.plan().unwrap().is_empty());

            for (path, content) in &written {
                prop_assert_eq!(&fs::read(backup.join(path)).unwrap(), content);
            }
        }
    }
}

/// Random file trees: relative path to content
fn tree_strategy(
    count: std::ops::Range<usize>,
) -> impl Strategy<Value = BTreeMap<PathBuf, Vec<u8>>> {
    prop::collection::btree_map(path_strategy(), prop::collection::vec(any::<u8>(), 0..64), count)
}

/// Write `files` below `root`, skipping paths that collide with a file
/// already written as a directory (or the reverse). Returns what was written.
fn write_tree(
    root: &Path,
    files: &BTreeMap<PathBuf, Vec<u8>>,
    mtime: i64,
) -> BTreeMap<PathBuf, Vec<u8>> {
    let mut written = BTreeMap::new();
    for (path, content) in files {
        let full = root.join(path);
        if let Some(parent) = full.parent() {
            if fs::create_dir_all(parent).is_err() {
                continue;
            }
        }
        if full.is_dir() || fs::write(&full, content).is_err() {
            continue;
        }
        filetime::set_file_mtime(&full, filetime::FileTime::from_unix_time(mtime, 0)).unwrap();
        written.insert(path.clone(), content.clone());
    }
    written
}

//! Main test module for Backstop
//!
//! This module includes all test suites:
//! - Integration tests over many changing cycles
//! - Property-based tests for planning and naming invariants
//! - Edge cases around unusual trees and file names

pub mod property;

#[cfg(test)]
mod edge_cases {
    use super::integration::{list_files, read_tree, MirrorTestHarness};
    use ::backstop::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    #[test]
    fn test_empty_source() {
        let mut harness = MirrorTestHarness::new();
        let report = harness.sync().unwrap();

        assert_eq!(report.total_operations(), 0);
        assert_eq!(report.source_files, 0);
        assert!(harness.backup().is_dir());
        assert!(harness.tombstones().is_dir());
    }

    #[test]
    fn test_emptied_source_tombstones_everything() {
        let mut harness = MirrorTestHarness::new();
        for i in 0..5 {
            harness
                .write_source(&Path::new("nested").join(format!("file_{}.txt", i)), b"content")
                .unwrap();
        }
        harness.sync().unwrap();

        fs::remove_dir_all(harness.source().join("nested")).unwrap();
        let report = harness.sync().unwrap();

        assert_eq!(report.tombstoned, 5);
        assert!(list_files(&harness.backup()).is_empty());
        assert!(!harness.backup().join("nested").exists());
        assert_eq!(harness.tombstone_count(), 5);
        harness.assert_nothing_lost();
    }

    #[test]
    fn test_empty_directories_are_not_mirrored() {
        let mut harness = MirrorTestHarness::new();
        fs::create_dir_all(harness.source().join("empty/deeper")).unwrap();
        harness.write_source(Path::new("file.txt"), b"x").unwrap();

        let report = harness.sync().unwrap();
        assert_eq!(report.copied, 1);
        assert!(!harness.backup().join("empty").exists());
    }

    #[test]
    fn test_special_filenames() {
        let mut harness = MirrorTestHarness::new();

        let special_names = vec![
            "file with spaces.txt",
            "file-with-dashes.txt",
            "file.with.dots.txt",
            "file@with#special$chars.txt",
            "file(with)parens.txt",
            "file[with]brackets.txt",
            "file{with}braces.txt",
            ".hidden",
            "no_extension",
        ];

        let mut created = Vec::new();
        for name in &special_names {
            if harness.write_source(Path::new(name), name.as_bytes()).is_ok() {
                created.push(*name);
            }
        }

        let report = harness.sync().unwrap();
        assert_eq!(report.copied, created.len());
        harness.assert_backup_matches_source();

        for name in &created {
            fs::remove_file(harness.source().join(name)).unwrap();
        }
        let report = harness.sync().unwrap();
        assert_eq!(report.tombstoned, created.len());
        harness.assert_nothing_lost();
    }

    #[test]
    fn test_unicode_filenames() {
        let mut harness = MirrorTestHarness::new();

        let unicode_names = vec![
            "файл.txt",
            "文件.txt",
            "ファイル.txt",
            "파일.txt",
            "αρχείο.txt",
            "🚀🌟💾.txt",
        ];

        let mut created = 0;
        for name in &unicode_names {
            let path = Path::new("ünïcödé").join(name);
            let content = format!("Unicode content: {}", name);
            if harness.write_source(&path, content.as_bytes()).is_ok() {
                created += 1;
            }
        }
        if created == 0 {
            // No unicode support on this system
            return;
        }

        let report = harness.sync().unwrap();
        assert_eq!(report.copied, created);
        harness.assert_backup_matches_source();
    }

    #[test]
    fn test_deeply_nested_file() {
        let mut harness = MirrorTestHarness::new();
        let mut path = std::path::PathBuf::new();
        for level in 0..30 {
            path.push(format!("level{}", level));
        }
        let path = path.join("leaf.txt");
        harness.write_source(&path, b"leaf").unwrap();

        harness.sync().unwrap();
        assert_eq!(fs::read(harness.backup().join(&path)).unwrap(), b"leaf");

        fs::remove_file(harness.source().join(&path)).unwrap();
        harness.sync().unwrap();
        assert!(!harness.backup().join("level0").exists());
        assert_eq!(harness.tombstone_count(), 1);
    }

    #[test]
    fn test_large_file_is_copied_intact() {
        let mut harness = MirrorTestHarness::new();
        let size = 4 * 1024 * 1024;
        let content = harness.file_generator.generate_binary_content(size..size + 1);
        harness.write_source(Path::new("big.bin"), &content).unwrap();

        let report = harness.sync().unwrap();
        assert_eq!(report.bytes_copied, content.len() as u64);
        assert_eq!(fs::read(harness.backup().join("big.bin")).unwrap(), content);
    }

    #[test]
    fn test_zero_byte_file() {
        let mut harness = MirrorTestHarness::new();
        harness.write_source(Path::new("empty.txt"), b"").unwrap();

        harness.sync().unwrap();
        assert!(harness.backup().join("empty.txt").is_file());
        assert!(harness.mirror.plan().unwrap().is_empty());
    }

    #[test]
    fn test_tombstone_area_inside_backup() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("source");
        let backup = temp.path().join("backup");
        fs::create_dir_all(&source).unwrap();
        fs::write(source.join("a.txt"), b"a").unwrap();

        let mirror = MirrorBuilder::new().build(&source, &backup, backup.join(".tombstones"));
        mirror.sync().unwrap();
        fs::remove_file(source.join("a.txt")).unwrap();
        assert_eq!(mirror.sync().unwrap().tombstoned, 1);

        // The tombstone must not itself be tombstoned on the next cycle
        let report = mirror.sync().unwrap();
        assert_eq!(report.total_operations(), 0);
        assert_eq!(report.backup_files, 0);
        assert_eq!(read_tree(&backup.join(".tombstones")).len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_skipped() {
        let mut harness = MirrorTestHarness::new();
        harness.write_source(Path::new("target.txt"), b"target").unwrap();
        std::os::unix::fs::symlink("target.txt", harness.source().join("link.txt")).unwrap();
        std::os::unix::fs::symlink("..", harness.source().join("loop")).unwrap();

        let report = harness.sync().unwrap();

        assert!(report.is_clean());
        assert_eq!(report.copied, 1);
        assert!(harness.backup().join("target.txt").exists());
        assert!(harness.backup().join("link.txt").symlink_metadata().is_err());
        assert!(harness.backup().join("loop").symlink_metadata().is_err());
    }

    #[test]
    fn test_config_file_drives_a_mirror() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("src")).unwrap();
        fs::write(temp.path().join("src/keep.txt"), b"keep").unwrap();
        fs::write(temp.path().join("src/skip.log"), b"skip").unwrap();

        let mut config = MirrorConfig::new(
            temp.path().join("src"),
            temp.path().join("bak"),
            temp.path().join("tomb"),
        );
        config.ignore_patterns = vec!["*.log".to_string()];
        config.save(&temp.path().join("mirror.json")).unwrap();

        let loaded = MirrorConfig::load(&temp.path().join("mirror.json")).unwrap();
        let report = Mirror::from_config(&loaded).unwrap().sync().unwrap();

        assert_eq!(report.copied, 1);
        assert!(temp.path().join("bak/keep.txt").exists());
        assert!(!temp.path().join("bak/skip.log").exists());
    }
}

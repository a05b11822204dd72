//! Configuration for a mirror
//!
//! [`MirrorConfig`] is what an outer process hands to the core: three roots,
//! a worker count, ignore patterns and the interval between cycles. It is
//! stored as JSON.
//!
//! ```json
//! {
//!   "source_root": "/data/misc",
//!   "backup_root": "/backup/misc",
//!   "tombstone_root": "/backup/deleted",
//!   "parallel_workers": 8,
//!   "ignore_patterns": ["*.tmp"],
//!   "preserve_mtime": true,
//!   "interval": "1h"
//! }
//! ```

use crate::error::{BackstopError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration of one source/backup/tombstone triple
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// Directory being backed up
    pub source_root: PathBuf,
    /// Mirror of the source tree
    pub backup_root: PathBuf,
    /// Where removed and superseded backup copies are kept
    pub tombstone_root: PathBuf,
    /// Number of parallel workers for execution
    #[serde(default = "default_workers")]
    pub parallel_workers: usize,
    /// Ignore patterns (gitignore style)
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
    /// Whether backup copies take the source's modification time
    #[serde(default = "default_true")]
    pub preserve_mtime: bool,
    /// Time between cycles when run periodically (humantime syntax)
    #[serde(default = "default_interval")]
    pub interval: String,
}

fn default_workers() -> usize {
    num_cpus::get()
}

fn default_true() -> bool {
    true
}

fn default_interval() -> String {
    "1h".to_string()
}

impl MirrorConfig {
    /// Configuration with defaults for everything but the roots
    pub fn new(
        source_root: impl Into<PathBuf>,
        backup_root: impl Into<PathBuf>,
        tombstone_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source_root: source_root.into(),
            backup_root: backup_root.into(),
            tombstone_root: tombstone_root.into(),
            parallel_workers: default_workers(),
            ignore_patterns: Vec::new(),
            preserve_mtime: true,
            interval: default_interval(),
        }
    }

    /// Load and validate a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: MirrorConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate and write this configuration as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Parsed [`interval`](Self::interval)
    pub fn interval(&self) -> Result<Duration> {
        humantime::parse_duration(&self.interval).map_err(|e| {
            BackstopError::invalid_config(format!("interval '{}': {}", self.interval, e))
        })
    }

    /// Check the configuration for obvious mistakes
    ///
    /// Roots must be set and pairwise different, at least one worker is
    /// required and the interval must be a positive duration. Whether the
    /// roots resolve to the same or illegally nested directories on disk is
    /// checked again at sync time.
    pub fn validate(&self) -> Result<()> {
        let roots = [
            ("source_root", &self.source_root),
            ("backup_root", &self.backup_root),
            ("tombstone_root", &self.tombstone_root),
        ];
        for (name, root) in &roots {
            if root.as_os_str().is_empty() {
                return Err(BackstopError::invalid_config(format!("{} is empty", name)));
            }
        }
        for (i, (left_name, left)) in roots.iter().enumerate() {
            for (right_name, right) in &roots[i + 1..] {
                if left == right {
                    return Err(BackstopError::invalid_config(format!(
                        "{} and {} are the same path {:?}",
                        left_name, right_name, left
                    )));
                }
            }
        }
        if self.parallel_workers == 0 {
            return Err(BackstopError::invalid_config("parallel_workers must be at least 1"));
        }
        if self.interval()?.is_zero() {
            return Err(BackstopError::invalid_config("interval must be greater than zero"));
        }
        Ok(())
    }
}

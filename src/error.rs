//! Error types for the Backstop library
//!
//! Two families of errors exist:
//!
//! - [`BackstopError`] is structural. A scan that cannot see its tree, a backup
//!   or tombstone root that cannot be created, an invalid configuration. These
//!   abort the current sync cycle and are returned to the caller.
//! - [`ActionError`] is per-file. A copy, rename or directory creation that
//!   failed for one relative path. These never abort a cycle; they are
//!   collected into [`SyncReport::errors`](crate::types::SyncReport) and the
//!   next cycle retries from whatever the filesystem then looks like.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the Backstop library
pub type Result<T> = std::result::Result<T, BackstopError>;

/// Main error type for all Backstop operations
#[derive(Debug, Error)]
pub enum BackstopError {
    /// A tree could not be walked or one of its entries could not be stat'ed
    #[error("Scan failed at {path:?}: {source}")]
    Scan {
        /// Path that could not be read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Scan root exists but is not a directory
    #[error("Scan root is not a directory: {0:?}")]
    ScanRootNotDirectory(PathBuf),

    /// Backup or tombstone root could not be created or resolved
    #[error("Setup failed for {path:?}: {source}")]
    Setup {
        /// Root that could not be prepared
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Pattern parsing error
    #[error("Invalid ignore pattern: {0}")]
    InvalidPattern(String),

    /// Worker pool could not be started
    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    /// I/O errors outside of a sync cycle (config files and the like)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors during JSON serialization/deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BackstopError {
    /// Create a scan error for `path`
    pub fn scan(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BackstopError::Scan {
            path: path.into(),
            source,
        }
    }

    /// Create a setup error for `path`
    pub fn setup(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BackstopError::Setup {
            path: path.into(),
            source,
        }
    }

    /// Create an invalid configuration error with a custom message
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        BackstopError::InvalidConfiguration(msg.into())
    }

    /// Create an internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        BackstopError::Internal(msg.into())
    }

    /// Check if this error came from a tree scan
    pub fn is_scan(&self) -> bool {
        matches!(
            self,
            BackstopError::Scan { .. } | BackstopError::ScanRootNotDirectory(_)
        )
    }

    /// Check if this error came from preparing the backup or tombstone roots
    pub fn is_setup(&self) -> bool {
        matches!(self, BackstopError::Setup { .. } | BackstopError::ThreadPool(_))
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            BackstopError::Scan { path, source }
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                format!("{:?} does not exist. Check the configured source and backup paths.", path)
            }
            BackstopError::Scan { path, source }
                if source.kind() == std::io::ErrorKind::PermissionDenied =>
            {
                format!(
                    "Permission denied while reading {:?}. The whole cycle was skipped; \
                     fix the permissions or add the path to the ignore patterns.",
                    path
                )
            }
            BackstopError::Setup { path, .. } => {
                format!(
                    "Could not create {:?}. Check that the parent exists and is writable.",
                    path
                )
            }
            _ => self.to_string(),
        }
    }
}

/// Stage of an action that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionStage {
    /// Creating a parent directory in the backup or tombstone tree
    CreateDir,
    /// Moving the backup copy into the tombstone tree
    Relocate,
    /// Copying the source file into the backup tree
    Copy,
}

impl fmt::Display for ActionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionStage::CreateDir => write!(f, "create-dir"),
            ActionStage::Relocate => write!(f, "relocate"),
            ActionStage::Copy => write!(f, "copy"),
        }
    }
}

/// Failure of one action for one relative path
///
/// The I/O error is flattened into its kind name and message so that reports
/// can be cloned, merged across workers and serialized.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{action} {path:?} failed during {stage}: {message}")]
pub struct ActionError {
    /// Relative path of the file the action was for
    pub path: PathBuf,
    /// Action that failed
    pub action: crate::types::ActionKind,
    /// Sub-step that failed
    pub stage: ActionStage,
    /// Underlying error message
    pub message: String,
}

impl ActionError {
    /// Build an action error from an I/O failure
    pub fn from_io(
        path: impl Into<PathBuf>,
        action: crate::types::ActionKind,
        stage: ActionStage,
        err: &std::io::Error,
    ) -> Self {
        Self {
            path: path.into(),
            action,
            stage,
            message: err.to_string(),
        }
    }
}

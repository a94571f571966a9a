//! Error types for scanning and selection.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::node::NodeId;

/// Errors that abort a scan.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Permission denied for a path.
    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// Path not found.
    #[error("Path not found: {path}")]
    NotFound { path: PathBuf },

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The scan was cancelled; the partial tree was discarded.
    #[error("Scan interrupted")]
    Interrupted,

    /// Invalid configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Root path is not a directory.
    #[error("Root path is not a directory: {path}")]
    NotADirectory { path: PathBuf },

    /// An entry arrived whose parent is not in the tree.
    #[error("Tree consistency error: parent of {path} is not indexed")]
    Consistency { path: PathBuf },

    /// Other error.
    #[error("{message}")]
    Other { message: String },
}

impl ScanError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            _ => Self::Io { path, source },
        }
    }
}

/// Kind of scan warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningKind {
    /// A directory's children could not be listed.
    UnreadableDirectory,
    /// An entry disappeared between listing and stat.
    VanishedEntry,
    /// Symbolic link target does not exist.
    BrokenSymlink,
    /// Error reading metadata.
    MetadataError,
    /// Error reading a directory entry.
    ReadError,
}

/// Non-fatal warning encountered during scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanWarning {
    /// Path where the warning occurred.
    pub path: PathBuf,
    /// Human-readable message.
    pub message: String,
    /// Kind of warning.
    pub kind: WarningKind,
}

impl ScanWarning {
    /// Create a new scan warning.
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>, kind: WarningKind) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            kind,
        }
    }

    /// Create an unreadable directory warning.
    pub fn unreadable(path: impl Into<PathBuf>, error: &dyn std::fmt::Display) -> Self {
        let path = path.into();
        Self {
            message: format!("Cannot read directory {}: {error}", path.display()),
            path,
            kind: WarningKind::UnreadableDirectory,
        }
    }

    /// Create a vanished entry warning.
    pub fn vanished(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            message: format!("Vanished during scan: {}", path.display()),
            path,
            kind: WarningKind::VanishedEntry,
        }
    }

    /// Create a broken symlink warning.
    pub fn broken_symlink(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            message: format!("Broken symlink: {}", path.display()),
            path,
            kind: WarningKind::BrokenSymlink,
        }
    }

    /// Create a metadata error warning.
    pub fn metadata_error(path: impl Into<PathBuf>, error: &std::io::Error) -> Self {
        Self {
            message: format!("Metadata error: {error}"),
            path: path.into(),
            kind: WarningKind::MetadataError,
        }
    }
}

/// Errors returned by the selection engine. The tree is left untouched.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectionError {
    /// No node is indexed under this path.
    #[error("No such node: {path}")]
    NodeNotFound { path: PathBuf },

    /// The id does not belong to this tree.
    #[error("No such node id: {}", id.0)]
    UnknownNode { id: NodeId },
}

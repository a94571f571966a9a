//! Core types for sievefile.
//!
//! This crate provides the in-memory tree of a scanned directory, the
//! tri-state selection engine that edits it, and scan configuration.

mod config;
mod error;
mod node;
mod selection;
mod tree;

pub use config::{IgnoreMatcher, ScanConfig, ScanConfigBuilder};
pub use error::{ScanError, ScanWarning, SelectionError, WarningKind};
pub use node::{EntryKind, Node, NodeId, Resolved, ScanEntry, Selection, SizeStatus};
pub use selection::{ChangeSet, SelectionEngine, SelectionObserver};
pub use tree::{Tree, TreeBuilder, TreeStats};

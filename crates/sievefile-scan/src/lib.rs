//! File system scanning engine for sievefile.
//!
//! This crate walks a directory once with jwalk and turns the walk into a
//! stream of [`ScanEvent`]s, which the core [`TreeBuilder`] folds into a
//! sized [`Tree`].
//!
//! # Example
//!
//! ```rust,no_run
//! use sievefile_scan::{JwalkScanner, ScanConfig};
//!
//! let config = ScanConfig::new("/path/to/scan");
//! let tree = JwalkScanner::new().scan(&config).unwrap();
//!
//! println!("Total size: {} bytes", tree.total_size());
//! println!("Unreadable directories: {}", tree.stats.unreadable_dirs);
//! ```
//!
//! # Background scans
//!
//! [`start_scan`] runs the scan on the blocking pool and reports progress
//! and the final result over a channel:
//!
//! ```rust,no_run
//! use sievefile_scan::{start_scan, ScanConfig, ScanMessage};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() {
//! let mut rx = start_scan(ScanConfig::new("/path/to/scan"), CancellationToken::new());
//! while let Some(message) = rx.recv().await {
//!     match message {
//!         ScanMessage::Progress(p) => println!("Scanned {} files", p.files_scanned),
//!         ScanMessage::Complete(result) => println!("Done: {}", result.is_ok()),
//!     }
//! }
//! # }
//! ```

mod background;
mod progress;
mod scanner;

pub use background::{start_scan, ScanMessage, SCAN_CHANNEL_SIZE};
pub use progress::ScanProgress;
pub use scanner::{build_tree, JwalkScanner, ScanEvent, ScanEvents};

// Re-export core types for convenience
pub use sievefile_core::{
    EntryKind, Node, NodeId, ScanConfig, ScanEntry, ScanError, ScanWarning, SizeStatus, Tree,
    TreeBuilder, TreeStats, WarningKind,
};

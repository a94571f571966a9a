//! Scan progress reporting.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Counters published while a scan runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanProgress {
    /// Number of files scanned so far.
    pub files_scanned: u64,
    /// Number of directories scanned so far.
    pub dirs_scanned: u64,
    /// Sum of the file sizes seen so far.
    pub bytes_scanned: u64,
    /// Last entry reported by the walker.
    pub current_path: PathBuf,
    /// Number of recovered failures so far.
    pub warnings_count: u64,
    /// Time since the scan started.
    pub elapsed: Duration,
}

impl ScanProgress {
    /// Create empty progress.
    pub fn new() -> Self {
        Self::default()
    }

    /// Files per second since the scan started.
    pub fn files_per_second(&self) -> f64 {
        match self.elapsed.as_secs_f64() {
            secs if secs > 0.0 => self.files_scanned as f64 / secs,
            _ => 0.0,
        }
    }

    /// Files and directories seen so far.
    pub fn total_items(&self) -> u64 {
        self.files_scanned + self.dirs_scanned
    }
}

impl fmt::Display for ScanProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} files, {} dirs, {} warnings in {:.1}s",
            self.files_scanned,
            self.dirs_scanned,
            self.warnings_count,
            self.elapsed.as_secs_f64()
        )
    }
}

/// Accumulates counters for one scan and decides when to publish them.
#[derive(Debug)]
pub(crate) struct ProgressTracker {
    started: Instant,
    every: u64,
    counts: ScanProgress,
}

impl ProgressTracker {
    /// Publish once every `every` entries.
    pub fn new(every: u64) -> Self {
        Self {
            started: Instant::now(),
            every: every.max(1),
            counts: ScanProgress::default(),
        }
    }

    /// Count a file and its bytes.
    pub fn record_file(&mut self, size: u64) {
        self.counts.files_scanned += 1;
        self.counts.bytes_scanned += size;
    }

    /// Count a directory.
    pub fn record_dir(&mut self) {
        self.counts.dirs_scanned += 1;
    }

    /// Count a recovered failure.
    pub fn record_warning(&mut self) {
        self.counts.warnings_count += 1;
    }

    /// True right after every `every`-th entry.
    pub fn due(&self) -> bool {
        self.counts.total_items() % self.every == 0
    }

    /// Time since the tracker was created.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Counters as of now, tagged with the entry just seen.
    pub fn snapshot(&self, current_path: &Path) -> ScanProgress {
        ScanProgress {
            current_path: current_path.to_path_buf(),
            elapsed: self.started.elapsed(),
            ..self.counts.clone()
        }
    }
}

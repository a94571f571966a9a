//! JWalk-based directory scanner.

use std::collections::VecDeque;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Instant;

#[cfg(unix)]
use std::os::unix::fs::MetadataExt;

use compact_str::CompactString;
use jwalk::{DirEntry, Parallelism, WalkDir};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use sievefile_core::{
    EntryKind, IgnoreMatcher, ScanConfig, ScanEntry, ScanError, ScanWarning, Tree, TreeBuilder,
    WarningKind,
};

use crate::progress::{ProgressTracker, ScanProgress};

type WalkItem = Result<DirEntry<((), ())>, jwalk::Error>;

/// One record of the scan stream.
#[derive(Debug, Clone)]
pub enum ScanEvent {
    /// A file or directory was found.
    Entry(ScanEntry),
    /// A per-entry failure that did not stop the scan.
    Warning(ScanWarning),
}

/// Lazy stream of [`ScanEvent`]s below a root directory.
///
/// Directories are always reported before their children. The stream can
/// only be consumed once.
pub struct ScanEvents {
    walker: Box<dyn Iterator<Item = WalkItem>>,
    pending: VecDeque<ScanEvent>,
}

impl ScanEvents {
    fn entry_events(&mut self, entry: DirEntry<((), ())>) {
        if entry.depth == 0 {
            return;
        }

        let path = entry.path();
        let Some(parent) = path.parent().map(Path::to_path_buf) else {
            return;
        };
        let name = CompactString::new(entry.file_name.to_string_lossy());
        let file_type = entry.file_type;

        if file_type.is_dir() {
            self.pending
                .push_back(ScanEvent::Entry(ScanEntry::directory(parent, name)));
            if let Some(err) = &entry.read_children_error {
                warn!(path = %path.display(), "unreadable directory");
                self.pending
                    .push_back(ScanEvent::Warning(ScanWarning::unreadable(&path, err)));
            }
        } else if file_type.is_symlink() {
            // Never traversed; a link to a directory stays a childless directory.
            match std::fs::metadata(&path) {
                Ok(target) if target.is_dir() => {
                    self.pending.push_back(ScanEvent::Entry(
                        ScanEntry::directory(parent, name).with_symlink(true),
                    ));
                }
                Ok(target) => {
                    self.pending.push_back(ScanEvent::Entry(
                        ScanEntry::file(parent, name, target.len()).with_symlink(true),
                    ));
                }
                Err(err) => {
                    let warning = if err.kind() == ErrorKind::NotFound {
                        ScanWarning::broken_symlink(&path)
                    } else {
                        ScanWarning::metadata_error(&path, &err)
                    };
                    self.pending.push_back(ScanEvent::Entry(
                        ScanEntry::file(parent, name, 0).with_symlink(true),
                    ));
                    self.pending.push_back(ScanEvent::Warning(warning));
                }
            }
        } else {
            match entry.metadata() {
                Ok(metadata) => {
                    self.pending.push_back(ScanEvent::Entry(ScanEntry::file(
                        parent,
                        name,
                        metadata.len(),
                    )));
                }
                Err(err) => {
                    let vanished = err.io_error().is_some_and(|e| e.kind() == ErrorKind::NotFound);
                    let warning = if vanished {
                        ScanWarning::vanished(&path)
                    } else {
                        ScanWarning::new(&path, err.to_string(), WarningKind::MetadataError)
                    };
                    warn!(path = %path.display(), "{}", warning.message);
                    self.pending
                        .push_back(ScanEvent::Entry(ScanEntry::file(parent, name, 0)));
                    self.pending.push_back(ScanEvent::Warning(warning));
                }
            }
        }
    }

    fn error_events(&mut self, err: jwalk::Error) {
        let path = err.path().map(Path::to_path_buf).unwrap_or_default();
        let kind = if err.io_error().is_some() && path.is_dir() {
            WarningKind::UnreadableDirectory
        } else {
            WarningKind::ReadError
        };
        warn!(path = %path.display(), "{err}");
        self.pending
            .push_back(ScanEvent::Warning(ScanWarning::new(path, err.to_string(), kind)));
    }
}

impl Iterator for ScanEvents {
    type Item = ScanEvent;

    fn next(&mut self) -> Option<ScanEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            match self.walker.next()? {
                Ok(entry) => self.entry_events(entry),
                Err(err) => self.error_events(err),
            }
        }
    }
}

impl std::fmt::Debug for ScanEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanEvents")
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

/// Scanner using jwalk for parallel directory reads.
pub struct JwalkScanner {
    progress_tx: broadcast::Sender<ScanProgress>,
}

impl JwalkScanner {
    /// Create a new scanner.
    pub fn new() -> Self {
        let (progress_tx, _) = broadcast::channel(100);
        Self { progress_tx }
    }

    /// Subscribe to scan progress updates.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanProgress> {
        self.progress_tx.subscribe()
    }

    /// Open the scan stream for the configured root.
    ///
    /// Fails if the root does not exist, is not a directory or cannot be
    /// listed. Later per-entry failures show up as warnings in the stream.
    pub fn walk(&self, config: &ScanConfig) -> Result<(PathBuf, ScanEvents), ScanError> {
        let root_path = config
            .root
            .canonicalize()
            .map_err(|e| ScanError::io(&config.root, e))?;

        if !root_path.is_dir() {
            return Err(ScanError::NotADirectory { path: root_path });
        }
        std::fs::read_dir(&root_path).map_err(|e| ScanError::io(&root_path, e))?;

        let root_metadata =
            std::fs::metadata(&root_path).map_err(|e| ScanError::io(&root_path, e))?;
        let root_device = get_dev(&root_metadata);
        let matcher = config.ignore_matcher()?;
        let cross_filesystems = config.cross_filesystems;

        let parallelism = match config.threads {
            0 => Parallelism::RayonDefaultPool {
                busy_timeout: std::time::Duration::from_millis(100),
            },
            n => Parallelism::RayonNewPool(n),
        };

        let walker = WalkDir::new(&root_path)
            .parallelism(parallelism)
            .skip_hidden(!config.include_hidden)
            .follow_links(false)
            .sort(true)
            .min_depth(0)
            .process_read_dir(move |_depth, _path, _state, children| {
                children.retain(|child| match child {
                    Ok(entry) => keep_entry(entry, &matcher, cross_filesystems, root_device),
                    Err(_) => true,
                });
            });

        let events = ScanEvents {
            walker: Box::new(walker.into_iter()),
            pending: VecDeque::new(),
        };
        Ok((root_path, events))
    }

    /// Perform a scan of the configured root.
    pub fn scan(&self, config: &ScanConfig) -> Result<Tree, ScanError> {
        self.scan_with_cancel(config, &CancellationToken::new())
    }

    /// Perform a scan that stops with [`ScanError::Interrupted`] once
    /// `cancel` fires. The partial tree is dropped.
    pub fn scan_with_cancel(
        &self,
        config: &ScanConfig,
        cancel: &CancellationToken,
    ) -> Result<Tree, ScanError> {
        let start = Instant::now();
        let (root_path, events) = self.walk(config)?;
        debug!(root = %root_path.display(), "scan started");

        let mut tracker = ProgressTracker::new(config.progress_interval);
        let mut builder = TreeBuilder::new(&root_path);

        for event in events {
            if cancel.is_cancelled() {
                break;
            }
            match event {
                ScanEvent::Entry(entry) => {
                    let path = entry.path();
                    match entry.kind {
                        EntryKind::File => tracker.record_file(entry.size),
                        EntryKind::Directory => tracker.record_dir(),
                    }
                    builder.push_entry(entry)?;
                    if tracker.due() {
                        let _ = self.progress_tx.send(tracker.snapshot(&path));
                    }
                }
                ScanEvent::Warning(warning) => {
                    tracker.record_warning();
                    builder.push_warning(warning);
                }
            }
        }

        // Also catches a cancel after the last event or on an empty root.
        if cancel.is_cancelled() {
            debug!(root = %root_path.display(), "scan cancelled");
            return Err(ScanError::Interrupted);
        }

        let scan_duration = start.elapsed();
        debug!(
            root = %root_path.display(),
            nodes = builder.len(),
            elapsed_ms = tracker.elapsed().as_millis() as u64,
            "scan finished"
        );
        Ok(builder.finish(config.clone(), scan_duration))
    }
}

impl Default for JwalkScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a tree from any scan stream rooted at `root_path`.
pub fn build_tree(
    root_path: impl Into<PathBuf>,
    config: ScanConfig,
    events: impl IntoIterator<Item = ScanEvent>,
) -> Result<Tree, ScanError> {
    let start = Instant::now();
    let mut builder = TreeBuilder::new(root_path);
    for event in events {
        match event {
            ScanEvent::Entry(entry) => {
                builder.push_entry(entry)?;
            }
            ScanEvent::Warning(warning) => builder.push_warning(warning),
        }
    }
    Ok(builder.finish(config, start.elapsed()))
}

/// Decide whether a listed child is reported (and descended into).
fn keep_entry(
    entry: &DirEntry<((), ())>,
    matcher: &IgnoreMatcher,
    cross_filesystems: bool,
    root_device: u64,
) -> bool {
    if matcher.is_ignored(&entry.file_name.to_string_lossy()) {
        return false;
    }
    if !cross_filesystems && entry.file_type.is_dir() {
        if let Ok(metadata) = entry.metadata() {
            return get_dev(&metadata) == root_device;
        }
    }
    true
}

/// Get the device ID from metadata.
#[cfg(unix)]
fn get_dev(metadata: &std::fs::Metadata) -> u64 {
    metadata.dev()
}

#[cfg(not(unix))]
fn get_dev(_metadata: &std::fs::Metadata) -> u64 {
    0 // Windows doesn't have device IDs in the same way
}

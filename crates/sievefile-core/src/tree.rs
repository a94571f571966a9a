//! Arena-backed file tree, its builder and statistics.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use compact_str::CompactString;
use serde::Serialize;
use tracing::debug;

use crate::config::ScanConfig;
use crate::error::{ScanError, ScanWarning, WarningKind};
use crate::node::{EntryKind, Node, NodeId, ScanEntry, Selection, SizeStatus};

/// Summary statistics for a scanned tree.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TreeStats {
    /// Total number of files (symlinks included).
    pub total_files: u64,
    /// Total number of directories, root excluded.
    pub total_dirs: u64,
    /// Total number of symbolic links.
    pub total_symlinks: u64,
    /// Directories whose children could not be listed.
    pub unreadable_dirs: u64,
    /// Entries that vanished between listing and stat.
    pub vanished_entries: u64,
    /// Maximum depth reached.
    pub max_depth: u32,
    /// Largest file (path, size).
    pub largest_file: Option<(PathBuf, u64)>,
}

impl TreeStats {
    /// Create new empty stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Update stats with a file entry.
    pub fn record_file(&mut self, path: &Path, size: u64, depth: u32) {
        self.total_files += 1;
        self.max_depth = self.max_depth.max(depth);

        if self.largest_file.as_ref().is_none_or(|(_, s)| size > *s) {
            self.largest_file = Some((path.to_path_buf(), size));
        }
    }

    /// Record a directory.
    pub fn record_dir(&mut self, depth: u32) {
        self.total_dirs += 1;
        self.max_depth = self.max_depth.max(depth);
    }

    /// Record a symlink.
    pub fn record_symlink(&mut self) {
        self.total_symlinks += 1;
    }

    /// Record a recovered warning.
    pub fn record_warning(&mut self, kind: WarningKind) {
        match kind {
            WarningKind::UnreadableDirectory => self.unreadable_dirs += 1,
            WarningKind::VanishedEntry | WarningKind::BrokenSymlink => self.vanished_entries += 1,
            WarningKind::MetadataError | WarningKind::ReadError => {}
        }
    }
}

/// Complete scanned tree.
///
/// Nodes live in an arena addressed by [`NodeId`]; the path index points into
/// the same arena. The structure is fixed after building, only selection
/// state changes afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct Tree {
    pub(crate) nodes: Vec<Node>,

    #[serde(skip)]
    index: HashMap<PathBuf, NodeId>,

    /// Root path that was scanned.
    pub root_path: PathBuf,

    /// When this scan was performed.
    pub scanned_at: SystemTime,

    /// Duration of the scan.
    pub scan_duration: Duration,

    /// Scan configuration used.
    pub config: ScanConfig,

    /// Summary statistics.
    pub stats: TreeStats,

    /// Warnings encountered during scan.
    pub warnings: Vec<ScanWarning>,
}

impl Tree {
    /// Id of the root node.
    pub fn root_id(&self) -> NodeId {
        NodeId::new(0)
    }

    /// The root node.
    pub fn root(&self) -> &Node {
        &self.nodes[0]
    }

    /// Get a node by id.
    ///
    /// # Panics
    ///
    /// Panics if the id was not issued by this tree.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    /// Get a node by id, if it belongs to this tree.
    pub fn try_node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    /// Number of nodes, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false: a tree has at least its root.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes in arena order (parents before children).
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Look up a node id by path. Relative paths are taken from the root.
    pub fn id_of(&self, path: impl AsRef<Path>) -> Option<NodeId> {
        let path = path.as_ref();
        if path.is_relative() {
            self.index.get(&self.root_path.join(path)).copied()
        } else {
            self.index.get(path).copied()
        }
    }

    /// Look up a node by path. Relative paths are taken from the root.
    pub fn get(&self, path: impl AsRef<Path>) -> Option<&Node> {
        self.id_of(path).map(|id| self.node(id))
    }

    /// Parent of the node at `path`.
    pub fn parent_of(&self, path: impl AsRef<Path>) -> Option<&Node> {
        self.get(path)
            .and_then(|node| node.parent)
            .map(|id| self.node(id))
    }

    /// Children of a node, empty for files.
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = &Node> + '_ {
        self.node(id)
            .children()
            .unwrap_or_default()
            .iter()
            .map(move |&child| self.node(child))
    }

    /// Ancestors of a node, nearest first. The node itself is not included.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = &Node> + '_ {
        std::iter::successors(self.node(id).parent.map(|p| self.node(p)), move |node| {
            node.parent.map(|p| self.node(p))
        })
    }

    /// The node and every node below it, in pre-order.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            if let Some(children) = self.node(current).children() {
                stack.extend(children.iter().rev());
            }
        }
        out
    }

    /// Path of a node relative to the root (empty for the root).
    pub fn relative_path(&self, id: NodeId) -> &Path {
        let path = self.node(id).path();
        path.strip_prefix(&self.root_path).unwrap_or(path)
    }

    /// The selection a node inherits: its own explicit choice, else the
    /// nearest explicit ancestor's, else [`Selection::Excluded`].
    pub fn base_selection(&self, id: NodeId) -> Selection {
        let node = self.node(id);
        node.explicit
            .or_else(|| self.ancestors(id).find_map(|a| a.explicit))
            .unwrap_or(Selection::Excluded)
    }

    /// Get the total size of the tree.
    pub fn total_size(&self) -> u64 {
        self.root().aggregate_size
    }

    /// Bytes currently selected for backup.
    pub fn selected_size(&self) -> u64 {
        self.root().selected_size
    }

    /// Whether any directory could not be read.
    pub fn has_unknown_sizes(&self) -> bool {
        self.stats.unreadable_dirs > 0
    }

    /// Check if there were any warnings during scanning.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Builds a [`Tree`] from a stream of [`ScanEntry`] records.
///
/// File sizes are added to their parent as they arrive. Directory aggregates
/// are only known once the stream is exhausted, so [`TreeBuilder::finish`]
/// runs a post-order pass that folds every directory into its parent.
#[derive(Debug)]
pub struct TreeBuilder {
    nodes: Vec<Node>,
    index: HashMap<PathBuf, NodeId>,
    root_path: PathBuf,
    stats: TreeStats,
    warnings: Vec<ScanWarning>,
}

impl TreeBuilder {
    /// Start a tree rooted at `root_path`.
    pub fn new(root_path: impl Into<PathBuf>) -> Self {
        let root_path = root_path.into();
        let name = root_path
            .file_name()
            .map(|n| CompactString::new(n.to_string_lossy()))
            .unwrap_or_else(|| CompactString::new(root_path.to_string_lossy()));

        let root = Node::new(
            NodeId::new(0),
            None,
            root_path.clone(),
            name,
            0,
            EntryKind::Directory,
        );
        let mut index = HashMap::new();
        index.insert(root_path.clone(), root.id);

        Self {
            nodes: vec![root],
            index,
            root_path,
            stats: TreeStats::new(),
            warnings: Vec::new(),
        }
    }

    /// Add a scanned entry. An already indexed path is ignored.
    pub fn push_entry(&mut self, entry: ScanEntry) -> Result<NodeId, ScanError> {
        let path = entry.path();
        if let Some(&existing) = self.index.get(&path) {
            return Ok(existing);
        }

        let parent_id = match self.index.get(&entry.parent) {
            Some(&id) if self.nodes[id.index()].is_dir() => id,
            _ => return Err(ScanError::Consistency { path }),
        };

        let id = NodeId::new(self.nodes.len());
        let depth = self.nodes[parent_id.index()].depth + 1;
        let mut node = Node::new(id, Some(parent_id), path.clone(), entry.name, depth, entry.kind);
        node.symlink = entry.symlink;

        if entry.symlink {
            self.stats.record_symlink();
        }
        match entry.kind {
            EntryKind::File => {
                node.own_size = entry.size;
                node.aggregate_size = entry.size;
                self.stats.record_file(&path, entry.size, depth);

                let parent = &mut self.nodes[parent_id.index()];
                parent.own_size += entry.size;
                parent.aggregate_size += entry.size;
            }
            EntryKind::Directory => self.stats.record_dir(depth),
        }

        if let Some(children) = self.nodes[parent_id.index()].children.as_mut() {
            children.push(id);
        }
        self.index.insert(path, id);
        self.nodes.push(node);
        Ok(id)
    }

    /// Record a recovered per-entry failure.
    ///
    /// An unreadable directory is flagged with an unknown size.
    pub fn push_warning(&mut self, warning: ScanWarning) {
        if warning.kind == WarningKind::UnreadableDirectory {
            if let Some(&id) = self.index.get(&warning.path) {
                let node = &mut self.nodes[id.index()];
                if node.size_status == SizeStatus::Unknown {
                    return;
                }
                node.size_status = SizeStatus::Unknown;
            }
        }
        self.stats.record_warning(warning.kind);
        self.warnings.push(warning);
    }

    /// Number of nodes added so far, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false: the root exists from the start.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Complete the directory aggregates and produce the tree.
    pub fn finish(mut self, config: ScanConfig, scan_duration: Duration) -> Tree {
        fold_directory_sizes(&mut self.nodes);
        debug!(
            nodes = self.nodes.len(),
            total = self.nodes[0].aggregate_size,
            "tree built"
        );

        Tree {
            nodes: self.nodes,
            index: self.index,
            root_path: self.root_path,
            scanned_at: SystemTime::now(),
            scan_duration,
            config,
            stats: self.stats,
            warnings: self.warnings,
        }
    }
}

/// Post-order pass adding each directory child's aggregate to its parent once.
fn fold_directory_sizes(nodes: &mut [Node]) {
    let mut stack = vec![(NodeId::new(0), false)];
    while let Some((id, children_done)) = stack.pop() {
        let Some(children) = nodes[id.index()].children.as_ref() else {
            continue;
        };

        if children_done {
            let from_dirs: u64 = children
                .iter()
                .map(|&c| &nodes[c.index()])
                .filter(|c| c.is_dir())
                .map(|c| c.aggregate_size)
                .sum();
            nodes[id.index()].aggregate_size += from_dirs;
        } else {
            stack.push((id, true));
            stack.extend(
                children
                    .iter()
                    .filter(|&&c| nodes[c.index()].is_dir())
                    .map(|&c| (c, false)),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const K: u64 = 1024;

    fn fixture() -> Tree {
        let mut builder = TreeBuilder::new("/r");
        builder.push_entry(ScanEntry::file("/r", "10k", 10 * K)).unwrap();
        builder.push_entry(ScanEntry::directory("/r", "dir1")).unwrap();
        builder.push_entry(ScanEntry::directory("/r", "dir2")).unwrap();
        builder.push_entry(ScanEntry::file("/r/dir1", "20k", 20 * K)).unwrap();
        builder.push_entry(ScanEntry::directory("/r/dir2", "dir3")).unwrap();
        builder.push_entry(ScanEntry::file("/r/dir2", "30k", 30 * K)).unwrap();
        builder.push_entry(ScanEntry::file("/r/dir2/dir3", "40k", 40 * K)).unwrap();
        builder
            .push_entry(ScanEntry::file("/r/dir2/dir3", "dangling", 0).with_symlink(true))
            .unwrap();
        builder.finish(ScanConfig::new("/r"), Duration::ZERO)
    }

    #[test]
    fn test_own_and_aggregate_sizes() {
        let tree = fixture();

        assert_eq!(tree.root().own_size(), 10 * K);
        assert_eq!(tree.root().aggregate_size(), 100 * K);

        let dir2 = tree.get("/r/dir2").unwrap();
        assert_eq!(dir2.own_size(), 30 * K);
        assert_eq!(dir2.aggregate_size(), 70 * K);

        let dir3 = tree.get("dir2/dir3").unwrap();
        assert_eq!(dir3.own_size(), 40 * K);
        assert_eq!(dir3.aggregate_size(), 40 * K);

        let dangling = tree.get("dir2/dir3/dangling").unwrap();
        assert_eq!(dangling.aggregate_size(), 0);
        assert!(dangling.is_symlink());
    }

    #[test]
    fn test_directory_before_parent_sizes_known() {
        // A nested directory discovered before its parent's files.
        let mut builder = TreeBuilder::new("/r");
        builder.push_entry(ScanEntry::directory("/r", "a")).unwrap();
        builder.push_entry(ScanEntry::directory("/r/a", "b")).unwrap();
        builder.push_entry(ScanEntry::file("/r/a/b", "f", 7)).unwrap();
        builder.push_entry(ScanEntry::file("/r/a", "g", 5)).unwrap();
        builder.push_entry(ScanEntry::file("/r", "h", 1)).unwrap();
        let tree = builder.finish(ScanConfig::new("/r"), Duration::ZERO);

        assert_eq!(tree.get("a").unwrap().own_size(), 5);
        assert_eq!(tree.get("a").unwrap().aggregate_size(), 12);
        assert_eq!(tree.root().own_size(), 1);
        assert_eq!(tree.total_size(), 13);
    }

    #[test]
    fn test_missing_parent_is_consistency_error() {
        let mut builder = TreeBuilder::new("/r");
        let err = builder
            .push_entry(ScanEntry::file("/r/nowhere", "f", 1))
            .unwrap_err();
        assert!(matches!(err, ScanError::Consistency { .. }));
    }

    #[test]
    fn test_file_parent_is_consistency_error() {
        let mut builder = TreeBuilder::new("/r");
        builder.push_entry(ScanEntry::file("/r", "f", 1)).unwrap();
        let err = builder.push_entry(ScanEntry::file("/r/f", "g", 1)).unwrap_err();
        assert!(matches!(err, ScanError::Consistency { .. }));
    }

    #[test]
    fn test_duplicate_entry_ignored() {
        let mut builder = TreeBuilder::new("/r");
        let first = builder.push_entry(ScanEntry::file("/r", "f", 3)).unwrap();
        let second = builder.push_entry(ScanEntry::file("/r", "f", 3)).unwrap();
        assert_eq!(first, second);

        let tree = builder.finish(ScanConfig::new("/r"), Duration::ZERO);
        assert_eq!(tree.total_size(), 3);
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn test_unreadable_directory_flagged() {
        let mut builder = TreeBuilder::new("/r");
        builder.push_entry(ScanEntry::directory("/r", "locked")).unwrap();
        builder.push_entry(ScanEntry::directory("/r", "empty")).unwrap();
        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        builder.push_warning(ScanWarning::unreadable("/r/locked", &denied));
        let tree = builder.finish(ScanConfig::new("/r"), Duration::ZERO);

        let locked = tree.get("locked").unwrap();
        let empty = tree.get("empty").unwrap();
        assert_eq!(locked.aggregate_size(), 0);
        assert_eq!(empty.aggregate_size(), 0);
        assert_eq!(locked.size_status(), SizeStatus::Unknown);
        assert_eq!(empty.size_status(), SizeStatus::Confirmed);
        assert!(tree.has_unknown_sizes());
        assert_eq!(tree.stats.unreadable_dirs, 1);
    }

    #[test]
    fn test_navigation() {
        let tree = fixture();
        let dir3 = tree.id_of("dir2/dir3").unwrap();

        let ancestors: Vec<&str> = tree.ancestors(dir3).map(|n| n.name()).collect();
        assert_eq!(ancestors, vec!["dir2", "r"]);

        assert_eq!(tree.parent_of("dir2/dir3/40k").unwrap().id(), dir3);
        assert_eq!(tree.relative_path(dir3), Path::new("dir2/dir3"));

        let below: Vec<&str> = tree
            .descendants(dir3)
            .into_iter()
            .map(|id| tree.node(id).name())
            .collect();
        assert_eq!(below, vec!["dir3", "40k", "dangling"]);

        let names: Vec<&str> = tree.children(tree.root_id()).map(|n| n.name()).collect();
        assert_eq!(names, vec!["10k", "dir1", "dir2"]);
    }

    #[test]
    fn test_stats() {
        let tree = fixture();
        assert_eq!(tree.stats.total_files, 5);
        assert_eq!(tree.stats.total_dirs, 3);
        assert_eq!(tree.stats.total_symlinks, 1);
        assert_eq!(tree.stats.max_depth, 3);
        assert_eq!(
            tree.stats.largest_file,
            Some((PathBuf::from("/r/dir2/dir3/40k"), 40 * K))
        );
    }
}

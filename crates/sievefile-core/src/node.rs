//! Tree node types and selection states.

use std::path::{Path, PathBuf};

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use strum::Display;

/// Index of a node within a [`Tree`](crate::Tree) arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

impl NodeId {
    /// Create a new NodeId from an arena index.
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    /// Get the arena index.
    pub fn index(self) -> usize {
        self.0
    }
}

/// Kind of entry reported by the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum EntryKind {
    /// Regular file, or a symlink that is not traversed.
    File,
    /// Directory.
    Directory,
}

/// Whether a node's sizes are fully known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display)]
pub enum SizeStatus {
    /// All entries below this node were read.
    #[default]
    Confirmed,
    /// The directory could not be read; its sizes are a lower bound.
    Unknown,
}

/// A selection the user can place on a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum Selection {
    /// Back the node up.
    Included,
    /// Leave the node out.
    Excluded,
}

impl Selection {
    /// The opposite selection.
    pub fn toggled(self) -> Self {
        match self {
            Selection::Included => Selection::Excluded,
            Selection::Excluded => Selection::Included,
        }
    }
}

/// Effective selection state of a node after inheritance and propagation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display)]
pub enum Resolved {
    /// Every leaf below is included.
    Included,
    /// Every leaf below is excluded. Fresh trees start here.
    #[default]
    Excluded,
    /// Descendants disagree. Only directories can be mixed.
    Mixed,
}

impl Resolved {
    /// Combine leaf states: agreeing states are kept, anything else is mixed.
    ///
    /// Returns `None` for an empty iterator.
    pub fn combine(states: impl IntoIterator<Item = Resolved>) -> Option<Resolved> {
        let mut acc = None;
        for state in states {
            let next = match acc {
                None => state,
                Some(prev) if prev == state => prev,
                Some(_) => Resolved::Mixed,
            };
            if next == Resolved::Mixed {
                return Some(Resolved::Mixed);
            }
            acc = Some(next);
        }
        acc
    }

    /// The selection this state corresponds to, if it is not mixed.
    pub fn as_selection(self) -> Option<Selection> {
        match self {
            Resolved::Included => Some(Selection::Included),
            Resolved::Excluded => Some(Selection::Excluded),
            Resolved::Mixed => None,
        }
    }
}

impl From<Selection> for Resolved {
    fn from(selection: Selection) -> Self {
        match selection {
            Selection::Included => Resolved::Included,
            Selection::Excluded => Resolved::Excluded,
        }
    }
}

/// One record of the scan stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanEntry {
    /// Path of the containing directory.
    pub parent: PathBuf,
    /// Base name.
    pub name: CompactString,
    /// File or directory.
    pub kind: EntryKind,
    /// Byte size (zero for directories and vanished entries).
    pub size: u64,
    /// Whether the entry is a symbolic link.
    pub symlink: bool,
}

impl ScanEntry {
    /// Create a file record.
    pub fn file(parent: impl Into<PathBuf>, name: impl Into<CompactString>, size: u64) -> Self {
        Self {
            parent: parent.into(),
            name: name.into(),
            kind: EntryKind::File,
            size,
            symlink: false,
        }
    }

    /// Create a directory record.
    pub fn directory(parent: impl Into<PathBuf>, name: impl Into<CompactString>) -> Self {
        Self {
            parent: parent.into(),
            name: name.into(),
            kind: EntryKind::Directory,
            size: 0,
            symlink: false,
        }
    }

    /// Mark the record as a symbolic link.
    pub fn with_symlink(mut self, symlink: bool) -> Self {
        self.symlink = symlink;
        self
    }

    /// Full path of the entry.
    pub fn path(&self) -> PathBuf {
        self.parent.join(self.name.as_str())
    }
}

/// A single file or directory in the tree.
///
/// Structural fields are fixed once the tree is built. Selection fields are
/// written only by the [`SelectionEngine`](crate::SelectionEngine).
#[derive(Debug, Clone, Serialize)]
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) parent: Option<NodeId>,
    pub(crate) path: PathBuf,
    pub(crate) name: CompactString,
    pub(crate) depth: u32,
    pub(crate) own_size: u64,
    pub(crate) aggregate_size: u64,
    /// `None` for files. This, not a size field, marks a directory.
    pub(crate) children: Option<Vec<NodeId>>,
    pub(crate) symlink: bool,
    pub(crate) size_status: SizeStatus,
    pub(crate) explicit: Option<Selection>,
    pub(crate) resolved: Resolved,
    pub(crate) selected_size: u64,
}

impl Node {
    pub(crate) fn new(
        id: NodeId,
        parent: Option<NodeId>,
        path: PathBuf,
        name: CompactString,
        depth: u32,
        kind: EntryKind,
    ) -> Self {
        Self {
            id,
            parent,
            path,
            name,
            depth,
            own_size: 0,
            aggregate_size: 0,
            children: match kind {
                EntryKind::Directory => Some(Vec::new()),
                EntryKind::File => None,
            },
            symlink: false,
            size_status: SizeStatus::Confirmed,
            explicit: None,
            resolved: Resolved::Excluded,
            selected_size: 0,
        }
    }

    /// Arena id of this node.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Parent id, `None` for the root.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Absolute path, unique within the tree.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name (the full root path for the root).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Depth below the root (root is 0).
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Bytes of the file itself, or of a directory's immediate files.
    pub fn own_size(&self) -> u64 {
        self.own_size
    }

    /// Bytes of the whole subtree.
    pub fn aggregate_size(&self) -> u64 {
        self.aggregate_size
    }

    /// Child ids in discovery order, `None` for files.
    pub fn children(&self) -> Option<&[NodeId]> {
        self.children.as_deref()
    }

    /// File or directory.
    pub fn kind(&self) -> EntryKind {
        if self.children.is_some() {
            EntryKind::Directory
        } else {
            EntryKind::File
        }
    }

    /// Check if this is a directory.
    pub fn is_dir(&self) -> bool {
        self.children.is_some()
    }

    /// Check if this is a file.
    pub fn is_file(&self) -> bool {
        self.children.is_none()
    }

    /// A file, or a directory without children.
    pub fn is_leaf(&self) -> bool {
        self.children.as_ref().is_none_or(|c| c.is_empty())
    }

    /// Whether the entry is a symlink (never followed).
    pub fn is_symlink(&self) -> bool {
        self.symlink
    }

    /// Whether the sizes are confirmed.
    pub fn size_status(&self) -> SizeStatus {
        self.size_status
    }

    /// Whether the sizes of this node could not be determined.
    pub fn size_unknown(&self) -> bool {
        self.size_status == SizeStatus::Unknown
    }

    /// Selection placed directly on this node, if any.
    pub fn explicit_selection(&self) -> Option<Selection> {
        self.explicit
    }

    /// Effective selection state.
    pub fn resolved(&self) -> Resolved {
        self.resolved
    }

    /// Bytes of this subtree that will be backed up.
    pub fn selected_size(&self) -> u64 {
        self.selected_size
    }
}

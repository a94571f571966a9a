//! Tri-state selection engine.
//!
//! The engine owns the [`Tree`] for the editing session and is the only
//! writer of node selection state. Every change goes through
//! [`SelectionEngine::set_selection`]:
//!
//! 1. the target gets the explicit selection,
//! 2. every descendant drops its explicit selection and takes the new state,
//! 3. ancestors are re-resolved until a level comes out unchanged,
//! 4. selected sizes are adjusted along the whole ancestor chain,
//! 5. observers receive the set of nodes whose displayed values changed.

use std::path::Path;

use tracing::trace;

use crate::error::SelectionError;
use crate::node::{NodeId, Resolved, Selection};
use crate::tree::Tree;

/// Nodes whose displayed values changed after one selection call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSet {
    /// Node the selection was placed on.
    pub target: NodeId,
    /// Changed nodes: the affected part of the subtree in pre-order,
    /// followed by ancestors nearest first.
    pub changed: Vec<NodeId>,
}

impl ChangeSet {
    /// Check if nothing visible changed.
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty()
    }

    /// Number of changed nodes.
    pub fn len(&self) -> usize {
        self.changed.len()
    }

    /// Check if a node changed.
    pub fn contains(&self, id: NodeId) -> bool {
        self.changed.contains(&id)
    }

    /// Paths of the changed nodes.
    pub fn paths<'t>(&self, tree: &'t Tree) -> Vec<&'t Path> {
        self.changed.iter().map(|&id| tree.node(id).path()).collect()
    }
}

/// Receives change notifications after each selection call.
pub trait SelectionObserver {
    fn selection_changed(&mut self, tree: &Tree, changes: &ChangeSet);
}

impl<F> SelectionObserver for F
where
    F: FnMut(&Tree, &ChangeSet),
{
    fn selection_changed(&mut self, tree: &Tree, changes: &ChangeSet) {
        self(tree, changes)
    }
}

/// Owns a tree and applies selection changes to it.
pub struct SelectionEngine {
    tree: Tree,
    observers: Vec<Box<dyn SelectionObserver>>,
}

impl std::fmt::Debug for SelectionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectionEngine")
            .field("tree", &self.tree.root_path)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl SelectionEngine {
    /// Start a session on a freshly built tree.
    pub fn new(tree: Tree) -> Self {
        Self {
            tree,
            observers: Vec::new(),
        }
    }

    /// Read access for views and rule derivation.
    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    /// End the session and take the tree back.
    pub fn into_tree(self) -> Tree {
        self.tree
    }

    /// Register an observer called after every selection call.
    pub fn subscribe(&mut self, observer: impl SelectionObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// Bytes currently selected for backup.
    pub fn selected_size(&self) -> u64 {
        self.tree.selected_size()
    }

    /// Every explicit selection in tree pre-order.
    pub fn explicit_selections(&self) -> Vec<(NodeId, Selection)> {
        self.tree
            .descendants(self.tree.root_id())
            .into_iter()
            .filter_map(|id| self.tree.node(id).explicit.map(|s| (id, s)))
            .collect()
    }

    /// Select or deselect the node at `path` and its whole subtree.
    pub fn set_selection(
        &mut self,
        path: impl AsRef<Path>,
        desired: Selection,
    ) -> Result<ChangeSet, SelectionError> {
        let path = path.as_ref();
        let id = self
            .tree
            .id_of(path)
            .ok_or_else(|| SelectionError::NodeNotFound {
                path: path.to_path_buf(),
            })?;
        Ok(self.apply(id, desired))
    }

    /// Same as [`set_selection`](Self::set_selection), addressed by id.
    pub fn set_selection_id(
        &mut self,
        id: NodeId,
        desired: Selection,
    ) -> Result<ChangeSet, SelectionError> {
        if self.tree.try_node(id).is_none() {
            return Err(SelectionError::UnknownNode { id });
        }
        Ok(self.apply(id, desired))
    }

    fn apply(&mut self, target: NodeId, desired: Selection) -> ChangeSet {
        trace!(path = %self.tree.node(target).path().display(), %desired, "set selection");

        let state = Resolved::from(desired);
        let nodes = &mut self.tree.nodes;
        let old_selected = nodes[target.index()].selected_size;
        nodes[target.index()].explicit = Some(desired);

        let mut changed = Vec::new();
        let mut stack = vec![target];
        while let Some(id) = stack.pop() {
            let node = &mut nodes[id.index()];
            if id != target {
                node.explicit = None;
            }
            let selected = match desired {
                Selection::Included => node.aggregate_size,
                Selection::Excluded => 0,
            };
            if node.resolved != state || node.selected_size != selected {
                node.resolved = state;
                node.selected_size = selected;
                changed.push(id);
            }
            if let Some(children) = &node.children {
                stack.extend(children.iter().rev());
            }
        }

        let new_selected = nodes[target.index()].selected_size;
        let mut resolving = true;
        let mut current = nodes[target.index()].parent;
        while let Some(id) = current {
            if !resolving && old_selected == new_selected {
                break;
            }

            let mut node_changed = false;
            if resolving {
                let next = Resolved::combine(
                    nodes[id.index()]
                        .children
                        .iter()
                        .flatten()
                        .map(|&c| nodes[c.index()].resolved),
                );
                let node = &mut nodes[id.index()];
                match next {
                    Some(next) if next != node.resolved => {
                        node.resolved = next;
                        node_changed = true;
                    }
                    _ => resolving = false,
                }
            }

            let node = &mut nodes[id.index()];
            if old_selected != new_selected {
                node.selected_size = node.selected_size - old_selected + new_selected;
                node_changed = true;
            }
            if node_changed {
                changed.push(id);
            }
            current = node.parent;
        }

        let changes = ChangeSet { target, changed };
        for observer in &mut self.observers {
            observer.selection_changed(&self.tree, &changes);
        }
        changes
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    use super::*;
    use crate::config::ScanConfig;
    use crate::node::ScanEntry;
    use crate::tree::TreeBuilder;

    fn tree() -> Tree {
        let mut builder = TreeBuilder::new("/r");
        builder.push_entry(ScanEntry::file("/r", "a", 1)).unwrap();
        builder.push_entry(ScanEntry::directory("/r", "d")).unwrap();
        builder.push_entry(ScanEntry::file("/r/d", "b", 10)).unwrap();
        builder.push_entry(ScanEntry::file("/r/d", "c", 100)).unwrap();
        builder.finish(ScanConfig::new("/r"), Duration::ZERO)
    }

    #[test]
    fn test_unknown_path_rejected() {
        let mut engine = SelectionEngine::new(tree());
        let err = engine.set_selection("/r/nope", Selection::Included).unwrap_err();
        assert_eq!(
            err,
            SelectionError::NodeNotFound {
                path: "/r/nope".into()
            }
        );
        assert_eq!(engine.selected_size(), 0);
        assert!(engine.explicit_selections().is_empty());
    }

    #[test]
    fn test_unknown_id_rejected() {
        let mut engine = SelectionEngine::new(tree());
        let err = engine
            .set_selection_id(NodeId::new(99), Selection::Included)
            .unwrap_err();
        assert!(matches!(err, SelectionError::UnknownNode { .. }));
    }

    #[test]
    fn test_include_subtree() {
        let mut engine = SelectionEngine::new(tree());
        let changes = engine.set_selection("d", Selection::Included).unwrap();

        let t = engine.tree();
        assert_eq!(t.get("d").unwrap().resolved(), Resolved::Included);
        assert_eq!(t.get("d/b").unwrap().resolved(), Resolved::Included);
        assert_eq!(t.root().resolved(), Resolved::Mixed);
        assert_eq!(t.get("a").unwrap().resolved(), Resolved::Excluded);
        assert_eq!(engine.selected_size(), 110);

        // d, b, c, then the root.
        assert_eq!(changes.len(), 4);
        assert_eq!(changes.changed.last(), Some(&t.root_id()));
        assert!(!changes.contains(t.id_of("a").unwrap()));
    }

    #[test]
    fn test_carve_out_exception() {
        let mut engine = SelectionEngine::new(tree());
        engine.set_selection("d", Selection::Included).unwrap();
        engine.set_selection("d/c", Selection::Excluded).unwrap();

        let t = engine.tree();
        assert_eq!(t.get("d").unwrap().resolved(), Resolved::Mixed);
        assert_eq!(t.get("d").unwrap().selected_size(), 10);
        assert_eq!(t.root().selected_size(), 10);
        assert_eq!(t.base_selection(t.id_of("d").unwrap()), Selection::Included);
    }

    #[test]
    fn test_ancestor_action_clears_descendant_choices() {
        let mut engine = SelectionEngine::new(tree());
        engine.set_selection("d/c", Selection::Included).unwrap();
        engine.set_selection("/r", Selection::Excluded).unwrap();

        let t = engine.tree();
        assert_eq!(t.get("d/c").unwrap().explicit_selection(), None);
        assert_eq!(t.get("d/c").unwrap().resolved(), Resolved::Excluded);
        assert_eq!(t.root().resolved(), Resolved::Excluded);
        assert_eq!(engine.explicit_selections().len(), 1);
        assert_eq!(engine.selected_size(), 0);
    }

    #[test]
    fn test_all_children_agree_resolves_parent() {
        let mut engine = SelectionEngine::new(tree());
        engine.set_selection("d/b", Selection::Included).unwrap();
        assert_eq!(engine.tree().get("d").unwrap().resolved(), Resolved::Mixed);

        engine.set_selection("d/c", Selection::Included).unwrap();
        assert_eq!(engine.tree().get("d").unwrap().resolved(), Resolved::Included);
        assert_eq!(engine.tree().root().resolved(), Resolved::Mixed);

        engine.set_selection("a", Selection::Included).unwrap();
        assert_eq!(engine.tree().root().resolved(), Resolved::Included);
        assert_eq!(engine.selected_size(), 111);
    }

    #[test]
    fn test_noop_still_notifies() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut engine = SelectionEngine::new(tree());
        let sink = Rc::clone(&seen);
        engine.subscribe(move |_: &Tree, changes: &ChangeSet| {
            sink.borrow_mut().push(changes.clone());
        });

        let changes = engine.set_selection("d", Selection::Excluded).unwrap();
        assert!(changes.is_empty());
        assert_eq!(seen.borrow().len(), 1);
        assert!(seen.borrow()[0].is_empty());
    }

    #[test]
    fn test_observer_sees_updated_tree() {
        let totals = Rc::new(RefCell::new(Vec::new()));
        let mut engine = SelectionEngine::new(tree());
        let sink = Rc::clone(&totals);
        engine.subscribe(move |tree: &Tree, changes: &ChangeSet| {
            let paths = changes.paths(tree);
            sink.borrow_mut().push((tree.selected_size(), paths.len()));
        });

        engine.set_selection("d/b", Selection::Included).unwrap();
        // b, d (excluded -> mixed), root (excluded -> mixed).
        assert_eq!(totals.borrow().as_slice(), &[(10, 3)]);
    }

    #[test]
    fn test_resolution_walk_stops_but_sizes_continue() {
        let mut engine = SelectionEngine::new(tree());
        engine.set_selection("d/b", Selection::Included).unwrap();
        let changes = engine.set_selection("d/c", Selection::Included).unwrap();

        let t = engine.tree();
        // d flips to Included; root stays Mixed but its size changes.
        assert!(changes.contains(t.id_of("d").unwrap()));
        assert!(changes.contains(t.root_id()));
        assert_eq!(t.root().selected_size(), 110);
    }
}

//! Derivation of include/exclude rules from a resolved selection.
//!
//! The tree is walked top-down while tracking the selection each node would
//! get from the rules emitted so far. A node gets a rule only where its own
//! target state differs from that inherited state:
//!
//! - an included or excluded node targets its resolved state, and its whole
//!   subtree agrees with it, so the walk stops there;
//! - a mixed directory targets its base state (the nearest explicit choice
//!   at or above it) and the walk continues into its children.
//!
//! This gives one rule per selection boundary and never restates a state
//! the rules already imply.

use tracing::debug;

use sievefile_core::{NodeId, Resolved, Selection, Tree};

use crate::rule::{Rule, RuleSet};

/// Turns a tree's resolved selection into a [`RuleSet`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleDeriver;

impl RuleDeriver {
    /// Create a new deriver.
    pub fn new() -> Self {
        Self
    }

    /// Derive the rules for the current selection of `tree`.
    pub fn derive(&self, tree: &Tree) -> RuleSet {
        let mut set = RuleSet::new(&tree.root_path);

        // (node, state inherited from emitted rules, nearest explicit above)
        let mut stack: Vec<(NodeId, Selection, Option<Selection>)> =
            vec![(tree.root_id(), Selection::Excluded, None)];

        while let Some((id, inherited, explicit_above)) = stack.pop() {
            let node = tree.node(id);
            let base = node.explicit_selection().or(explicit_above);
            let target = node
                .resolved()
                .as_selection()
                .unwrap_or_else(|| base.unwrap_or(Selection::Excluded));

            if target != inherited {
                let path = node.path().to_path_buf();
                set.push(match target {
                    Selection::Included => Rule::include(path, node.is_dir()),
                    Selection::Excluded => Rule::exclude(path, node.is_dir()),
                });
            }

            if node.resolved() == Resolved::Mixed {
                if let Some(children) = node.children() {
                    stack.extend(children.iter().rev().map(|&c| (c, target, base)));
                }
            }
        }

        debug!(rules = set.len(), "rules derived");
        set
    }
}

/// Derive rules with the default deriver.
pub fn derive_rules(tree: &Tree) -> RuleSet {
    RuleDeriver::new().derive(tree)
}

use std::path::PathBuf;
use std::time::Duration;

use proptest::prelude::*;
use sievefile_core::{
    NodeId, Resolved, ScanConfig, ScanEntry, Selection, SelectionEngine, Tree, TreeBuilder,
};

/// Build a tree from (parent choice, is_dir, size) triples.
fn build(shape: &[(usize, bool, u64)]) -> Tree {
    let root = PathBuf::from("/root");
    let mut builder = TreeBuilder::new(&root);
    let mut dirs = vec![root.clone()];

    for (i, &(parent, is_dir, size)) in shape.iter().enumerate() {
        let parent = dirs[parent % dirs.len()].clone();
        let name = format!("n{i}");
        if is_dir {
            dirs.push(parent.join(&name));
            builder.push_entry(ScanEntry::directory(parent, name)).unwrap();
        } else {
            builder.push_entry(ScanEntry::file(parent, name, size)).unwrap();
        }
    }
    builder.finish(ScanConfig::new(root), Duration::ZERO)
}

fn check_invariants(tree: &Tree) {
    for node in tree.nodes() {
        match node.children() {
            None => {
                assert_eq!(node.aggregate_size(), node.own_size());
                assert_ne!(node.resolved(), Resolved::Mixed);
                let expected = match node.resolved() {
                    Resolved::Included => node.own_size(),
                    _ => 0,
                };
                assert_eq!(node.selected_size(), expected);
            }
            Some(children) => {
                let kids: Vec<_> = children.iter().map(|&c| tree.node(c)).collect();
                let own: u64 = kids.iter().filter(|c| c.is_file()).map(|c| c.own_size()).sum();
                let aggregate: u64 = kids.iter().map(|c| c.aggregate_size()).sum();
                let selected: u64 = kids.iter().map(|c| c.selected_size()).sum();
                assert_eq!(node.own_size(), own, "own size of {:?}", node.path());
                assert_eq!(node.aggregate_size(), aggregate, "aggregate of {:?}", node.path());

                if kids.is_empty() {
                    assert_ne!(node.resolved(), Resolved::Mixed);
                    assert_eq!(node.selected_size(), 0);
                } else {
                    let combined = Resolved::combine(kids.iter().map(|c| c.resolved()));
                    assert_eq!(Some(node.resolved()), combined, "state of {:?}", node.path());
                    assert_eq!(node.selected_size(), selected);
                }
                match node.resolved() {
                    Resolved::Included => assert_eq!(node.selected_size(), node.aggregate_size()),
                    Resolved::Excluded => assert_eq!(node.selected_size(), 0),
                    Resolved::Mixed => {}
                }
            }
        }
    }
}

fn leaf_states(tree: &Tree, id: NodeId) -> Vec<Resolved> {
    tree.descendants(id)
        .into_iter()
        .map(|d| tree.node(d))
        .filter(|n| n.is_leaf())
        .map(|n| n.resolved())
        .collect()
}

fn snapshot(tree: &Tree) -> Vec<(Option<Selection>, Resolved, u64)> {
    tree.nodes()
        .iter()
        .map(|n| (n.explicit_selection(), n.resolved(), n.selected_size()))
        .collect()
}

fn shape_strategy() -> impl Strategy<Value = Vec<(usize, bool, u64)>> {
    prop::collection::vec((0usize..64, any::<bool>(), 0u64..10_000), 0..40)
}

fn selections_strategy() -> impl Strategy<Value = Vec<(usize, bool)>> {
    prop::collection::vec((0usize..64, any::<bool>()), 0..12)
}

fn selection(include: bool) -> Selection {
    if include {
        Selection::Included
    } else {
        Selection::Excluded
    }
}

#[test]
fn test_fresh_tree_is_excluded() {
    let tree = build(&[(0, true, 0), (1, false, 5), (0, false, 7)]);
    check_invariants(&tree);
    assert_eq!(tree.root().resolved(), Resolved::Excluded);
    assert_eq!(tree.selected_size(), 0);
    assert_eq!(tree.total_size(), 12);
}

#[test]
fn test_inverse_pair_restores_state() {
    let mut engine = SelectionEngine::new(build(&[
        (0, true, 0),
        (1, false, 5),
        (1, true, 0),
        (2, false, 9),
        (0, false, 7),
    ]));
    engine.set_selection("n4", Selection::Included).unwrap();
    let before = snapshot(engine.tree());

    engine.set_selection("n0", Selection::Included).unwrap();
    engine.set_selection("n0", Selection::Excluded).unwrap();
    let after = snapshot(engine.tree());

    for (b, a) in before.iter().zip(&after) {
        assert_eq!((b.1, b.2), (a.1, a.2));
    }
}

proptest! {
    #[test]
    fn prop_sizes_hold_after_build(shape in shape_strategy()) {
        let tree = build(&shape);
        check_invariants(&tree);
        let files: u64 = tree.nodes().iter().filter(|n| n.is_file()).map(|n| n.own_size()).sum();
        prop_assert_eq!(tree.total_size(), files);
    }

    #[test]
    fn prop_invariants_hold_after_selections(
        shape in shape_strategy(),
        picks in selections_strategy(),
    ) {
        let tree = build(&shape);
        let len = tree.len();
        let mut engine = SelectionEngine::new(tree);
        for (pick, include) in picks {
            engine.set_selection_id(NodeId::new(pick % len), selection(include)).unwrap();
            check_invariants(engine.tree());
        }

        let tree = engine.tree();
        for node in tree.nodes() {
            if node.resolved() == Resolved::Mixed {
                let leaves = leaf_states(tree, node.id());
                prop_assert!(leaves.contains(&Resolved::Included));
                prop_assert!(leaves.contains(&Resolved::Excluded));
            }
        }
    }

    #[test]
    fn prop_selection_is_idempotent(
        shape in shape_strategy(),
        picks in selections_strategy(),
        last in (0usize..64, any::<bool>()),
    ) {
        let tree = build(&shape);
        let len = tree.len();
        let mut engine = SelectionEngine::new(tree);
        for (pick, include) in picks {
            engine.set_selection_id(NodeId::new(pick % len), selection(include)).unwrap();
        }

        let target = NodeId::new(last.0 % len);
        engine.set_selection_id(target, selection(last.1)).unwrap();
        let once = snapshot(engine.tree());
        let changes = engine.set_selection_id(target, selection(last.1)).unwrap();
        prop_assert!(changes.is_empty());
        prop_assert_eq!(once, snapshot(engine.tree()));
    }

    #[test]
    fn prop_inverse_pair_on_untouched_subtree(
        shape in shape_strategy(),
        picks in selections_strategy(),
        target in 0usize..64,
    ) {
        let tree = build(&shape);
        let len = tree.len();
        let target = NodeId::new(target % len);
        let mut engine = SelectionEngine::new(tree);

        // Only act outside the target's subtree so it stays untouched.
        let inside = engine.tree().descendants(target);
        let in_subtree_or_above = |id: NodeId, tree: &Tree| {
            inside.contains(&id) || tree.ancestors(target).any(|a| a.id() == id)
        };
        for (pick, include) in picks {
            let id = NodeId::new(pick % len);
            if !in_subtree_or_above(id, engine.tree()) {
                engine.set_selection_id(id, selection(include)).unwrap();
            }
        }

        let base = engine.tree().base_selection(target);
        prop_assume!(base == Selection::Excluded);
        let before = snapshot(engine.tree());

        engine.set_selection_id(target, Selection::Included).unwrap();
        engine.set_selection_id(target, Selection::Excluded).unwrap();
        let after = snapshot(engine.tree());

        for (b, a) in before.iter().zip(&after) {
            prop_assert_eq!((b.1, b.2), (a.1, a.2));
        }
    }
}

//! Keyed list reconciler: child-sequence diffing with identity keys
use crate::config::ReconcilerConfig;
use crate::diff_engine::DiffEngine;
use crate::types::{Key, Node, Patch, child_path};
use std::collections::{HashMap, HashSet};

/// How two children at the same index are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotMode {
    /// Neither child carries an identity: compare by position.
    Unkeyed,
    /// Both carry the same identity.
    Keyed,
    /// Identities differ, or only one side carries one.
    Mismatched,
}

/// Keys declared more than once in either sibling list. A duplicated key
/// identifies no single child, so its children are compared by position.
fn duplicated_keys<'a>(old: &'a [Node], new: &'a [Node]) -> HashSet<&'a Key> {
    let mut duplicated = HashSet::new();
    for children in [old, new] {
        let mut seen = HashSet::new();
        for (i, key) in children.iter().enumerate().filter_map(|(i, c)| Some((i, c.key()?))) {
            if !seen.insert(key) && duplicated.insert(key) {
                log::warn!("diff_children: duplicate sibling key '{}' at index {}", key, i);
            }
        }
    }
    duplicated
}

/// Sibling identity of `node`, unless its key is ambiguous.
fn identity<'a>(node: &'a Node, duplicated: &HashSet<&Key>) -> Option<&'a Key> {
    node.key().filter(|key| !duplicated.contains(*key))
}

fn slot_mode(old: Option<&Key>, new: Option<&Key>) -> SlotMode {
    match (old, new) {
        (None, None) => SlotMode::Unkeyed,
        (Some(a), Some(b)) if a == b => SlotMode::Keyed,
        _ => SlotMode::Mismatched,
    }
}

/// Identity -> sibling index over children with an unambiguous key.
fn key_index<'a>(children: &'a [Node], duplicated: &HashSet<&Key>) -> HashMap<&'a Key, usize> {
    children
        .iter()
        .enumerate()
        .filter_map(|(i, child)| Some((identity(child, duplicated)?, i)))
        .collect()
}

/// True when the length change is too large for granular diffing to pay off.
fn should_bail_out(old_len: usize, new_len: usize, ratio: f64) -> bool {
    let delta = old_len.abs_diff(new_len) as f64;
    delta > ratio * old_len.max(new_len) as f64
}

impl DiffEngine<'_> {
    /// Diff two ordered child sequences living under `path`.
    pub fn diff_children(&mut self, old: &[Node], new: &[Node], path: &[usize]) {
        if should_bail_out(old.len(), new.len(), self.config.bail_out_ratio) {
            log::debug!(
                "diff_children at {:?}: bail out ({} -> {} children)",
                path,
                old.len(),
                new.len()
            );
            self.replace(path, &Node::forest(new.to_vec()));
            return;
        }

        let duplicated = duplicated_keys(old, new);
        let old_keys = key_index(old, &duplicated);
        let new_keys = key_index(new, &duplicated);

        let shared = old.len().min(new.len());
        for i in 0..shared {
            let (old_child, new_child) = (&old[i], &new[i]);
            let slot = child_path(path, i);
            let (old_id, new_id) = (identity(old_child, &duplicated), identity(new_child, &duplicated));
            match slot_mode(old_id, new_id) {
                SlotMode::Unkeyed | SlotMode::Keyed => self.diff_node(Some(old_child), Some(new_child), &slot),
                SlotMode::Mismatched => {
                    let old_key_moved = old_id.and_then(|k| new_keys.get(k)).is_some_and(|&j| j != i);
                    let source = new_id.and_then(|k| old_keys.get(k)).copied();
                    match source {
                        Some(from) if old_key_moved => {
                            self.patches.push(Patch::Move {
                                path: slot.clone(),
                                from,
                                to: i,
                            });
                            if self.config.rediff_moved {
                                self.diff_node(Some(&old[from]), Some(new_child), &slot);
                            }
                        }
                        _ => self.replace(&slot, new_child),
                    }
                }
            }
        }

        // Trailing removals go back to front so earlier indices stay valid.
        for i in (shared..old.len()).rev() {
            self.diff_node(Some(&old[i]), None, &child_path(path, i));
        }
        for (i, child) in new.iter().enumerate().skip(shared) {
            self.diff_node(None, Some(child), &child_path(path, i));
        }
    }
}

/// Diff two child sequences with the default configuration.
pub fn diff_children(old: &[Node], new: &[Node], path: &[usize]) -> Vec<Patch> {
    diff_children_with_config(&ReconcilerConfig::default(), old, new, path)
}

pub fn diff_children_with_config(
    config: &ReconcilerConfig,
    old: &[Node],
    new: &[Node],
    path: &[usize],
) -> Vec<Patch> {
    let mut engine = DiffEngine::new(config);
    engine.diff_children(old, new, path);
    engine.into_patches()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Element, PropValue};

    fn item(key: i32, text: &str) -> Node {
        Element::new("li").with_key(key).with_child(Node::text(text)).into()
    }

    fn plain(text: &str) -> Node {
        Element::new("li").with_child(Node::text(text)).into()
    }

    #[test]
    fn swapped_keys_move_instead_of_replace() {
        let old = vec![item(1, "a"), item(2, "b")];
        let new = vec![item(2, "b"), item(1, "a")];
        let patches = diff_children(&old, &new, &[]);
        assert!(patches.iter().any(|p| matches!(p, Patch::Move { .. })));
        assert!(!patches.iter().any(|p| matches!(p, Patch::Replace { .. })));
        assert_eq!(
            patches,
            vec![
                Patch::Move { path: vec![0], from: 1, to: 0 },
                Patch::Move { path: vec![1], from: 0, to: 1 },
            ]
        );
    }

    #[test]
    fn large_shrink_bails_out_to_single_replace() {
        let old: Vec<Node> = (0..10).map(|i| item(i, "x")).collect();
        let new = vec![item(0, "x"), item(1, "x")];
        let patches = diff_children(&old, &new, &[4]);
        assert_eq!(
            patches,
            vec![Patch::Replace { path: vec![4], node: Node::forest(new) }]
        );
    }

    #[test]
    fn bail_out_ratio_is_tunable() {
        let config = ReconcilerConfig { bail_out_ratio: 1.0, ..ReconcilerConfig::default() };
        let old: Vec<Node> = (0..10).map(|i| item(i, "x")).collect();
        let new = vec![item(0, "x"), item(1, "x")];
        let patches = diff_children_with_config(&config, &old, &new, &[]);
        assert_eq!(patches.len(), 8);
        assert_eq!(patches[0], Patch::Remove { path: vec![9] });
        assert_eq!(patches[7], Patch::Remove { path: vec![2] });
    }

    #[test]
    fn unknown_key_is_replaced() {
        let old = vec![item(1, "a"), item(2, "b")];
        let new = vec![item(3, "c"), item(2, "b")];
        let patches = diff_children(&old, &new, &[]);
        assert_eq!(patches, vec![Patch::Replace { path: vec![0], node: item(3, "c") }]);
    }

    #[test]
    fn moved_child_content_is_rediffed() {
        let old = vec![item(1, "a"), item(2, "b")];
        let new = vec![item(2, "B"), item(1, "a")];
        let patches = diff_children(&old, &new, &[]);
        assert_eq!(
            patches,
            vec![
                Patch::Move { path: vec![0], from: 1, to: 0 },
                Patch::Replace { path: vec![0, 0], node: Node::text("B") },
                Patch::Move { path: vec![1], from: 0, to: 1 },
            ]
        );
    }

    #[test]
    fn rediff_can_be_disabled() {
        let config = ReconcilerConfig { rediff_moved: false, ..ReconcilerConfig::default() };
        let old = vec![item(1, "a"), item(2, "b")];
        let new = vec![item(2, "B"), item(1, "a")];
        let patches = diff_children_with_config(&config, &old, &new, &[]);
        assert_eq!(patches.len(), 2);
        assert!(patches.iter().all(|p| matches!(p, Patch::Move { .. })));
    }

    #[test]
    fn unkeyed_children_compare_by_position() {
        let old = vec![plain("a"), item(5, "k"), plain("b")];
        let new = vec![plain("a"), item(5, "k"), plain("c")];
        let patches = diff_children(&old, &new, &[]);
        assert_eq!(patches, vec![Patch::Replace { path: vec![2, 0], node: Node::text("c") }]);
    }

    #[test]
    fn keyed_against_unkeyed_is_replaced() {
        let old = vec![item(1, "a"), plain("b")];
        let new = vec![plain("a"), plain("b")];
        let patches = diff_children(&old, &new, &[]);
        assert_eq!(patches, vec![Patch::Replace { path: vec![0], node: plain("a") }]);
    }

    #[test]
    fn keyed_child_props_are_diffed_in_place() {
        let old = vec![Element::new("li").with_key("x").with_prop("class", "a").into()];
        let new = vec![Element::new("li").with_key("x").with_prop("class", "b").into()];
        let patches = diff_children(&old, &new, &[3]);
        assert_eq!(
            patches,
            vec![Patch::UpdateProp {
                path: vec![3, 0],
                name: "class".into(),
                old: Some(PropValue::from("a")),
                new: Some(PropValue::from("b")),
            }]
        );
    }

    #[test]
    fn growth_within_threshold_appends() {
        let old = vec![item(1, "a"), item(2, "b")];
        let new = vec![item(1, "a"), item(2, "b"), item(3, "c")];
        let patches = diff_children(&old, &new, &[]);
        assert_eq!(patches, vec![Patch::Create { path: vec![2], node: item(3, "c") }]);
    }

    #[test]
    fn empty_lists_are_quiet() {
        assert!(diff_children(&[], &[], &[]).is_empty());
    }

    #[test]
    fn duplicated_keys_fall_back_to_positions() {
        let old = vec![item(0, "a"), item(0, "b"), item(1, "c")];
        let new = vec![item(1, "c"), item(0, "a"), item(1, "d")];
        let patches = diff_children(&old, &new, &[]);
        assert_eq!(
            patches,
            vec![
                Patch::Replace { path: vec![0, 0], node: Node::text("c") },
                Patch::Replace { path: vec![1, 0], node: Node::text("a") },
                Patch::Replace { path: vec![2, 0], node: Node::text("d") },
            ]
        );
    }

    #[test]
    fn key_duplicated_on_one_side_never_moves() {
        let old = vec![item(1, "a"), item(2, "b")];
        let new = vec![item(2, "b"), item(2, "b2")];
        let patches = diff_children(&old, &new, &[]);
        assert_eq!(
            patches,
            vec![
                Patch::Replace { path: vec![0], node: item(2, "b") },
                Patch::Replace { path: vec![1, 0], node: Node::text("b2") },
            ]
        );
    }

    #[test]
    fn unique_key_facing_ambiguous_slot_is_replaced() {
        let old = vec![item(7, "x"), item(7, "y"), item(3, "z")];
        let new = vec![item(3, "z"), item(7, "y"), item(7, "x")];
        let patches = diff_children(&old, &new, &[]);
        assert_eq!(
            patches,
            vec![
                Patch::Replace { path: vec![0], node: item(3, "z") },
                Patch::Replace { path: vec![2], node: item(7, "x") },
            ]
        );
    }
}

//! Node differ: compares two canonical trees and records patches
use crate::config::ReconcilerConfig;
use crate::types::{Element, Node, Patch, Props};

/// Accumulates the patch list for one diff invocation.
///
/// Patch order for a node is fixed: its own create/remove/replace decision,
/// then its prop updates, then its children's patches in child-index order.
pub struct DiffEngine<'a> {
    pub(crate) config: &'a ReconcilerConfig,
    pub(crate) patches: Vec<Patch>,
}

impl<'a> DiffEngine<'a> {
    pub fn new(config: &'a ReconcilerConfig) -> Self {
        DiffEngine {
            config,
            patches: Vec::new(),
        }
    }

    pub fn into_patches(self) -> Vec<Patch> {
        self.patches
    }

    pub fn diff_node(&mut self, old: Option<&Node>, new: Option<&Node>, path: &[usize]) {
        match (old, new) {
            (None, None) => {}
            (None, Some(new)) => self.patches.push(Patch::Create {
                path: path.to_vec(),
                node: new.clone(),
            }),
            (Some(_), None) => self.patches.push(Patch::Remove { path: path.to_vec() }),
            (Some(old), Some(new)) => self.diff_present(old, new, path),
        }
    }

    fn diff_present(&mut self, old: &Node, new: &Node, path: &[usize]) {
        match (old, new) {
            (Node::Text { text: a }, Node::Text { text: b }) => {
                if a != b {
                    self.replace(path, new);
                }
            }
            (Node::Forest { children: a }, Node::Forest { children: b }) => self.diff_children(a, b, path),
            // Shape change. `Replace` with a forest means "replace the child
            // list", so a node turning into a forest is removed and recreated.
            (_, Node::Forest { .. }) => {
                self.patches.push(Patch::Remove { path: path.to_vec() });
                self.patches.push(Patch::Create {
                    path: path.to_vec(),
                    node: new.clone(),
                });
            }
            (Node::Forest { .. }, _) | (Node::Text { .. }, _) | (_, Node::Text { .. }) => self.replace(path, new),
            (Node::Element(a), Node::Element(b)) => {
                if a.tag != b.tag {
                    self.replace(path, new);
                } else {
                    self.diff_element(a, b, path);
                }
            }
        }
    }

    fn diff_element(&mut self, old: &Element, new: &Element, path: &[usize]) {
        self.diff_props(&old.props, &new.props, path);
        self.diff_children(&old.children, &new.children, path);
    }

    /// Symmetric prop difference: old names first in old order, then names only in new.
    fn diff_props(&mut self, old: &Props, new: &Props, path: &[usize]) {
        for (name, old_value) in old {
            match new.get(name) {
                Some(new_value) if new_value == old_value => {}
                new_value => self.patches.push(Patch::UpdateProp {
                    path: path.to_vec(),
                    name: name.clone(),
                    old: Some(old_value.clone()),
                    new: new_value.cloned(),
                }),
            }
        }
        for (name, new_value) in new {
            if !old.contains_key(name) {
                self.patches.push(Patch::UpdateProp {
                    path: path.to_vec(),
                    name: name.clone(),
                    old: None,
                    new: Some(new_value.clone()),
                });
            }
        }
    }

    pub(crate) fn replace(&mut self, path: &[usize], node: &Node) {
        self.patches.push(Patch::Replace {
            path: path.to_vec(),
            node: node.clone(),
        });
    }
}

/// Diff two optional canonical nodes with the default configuration.
pub fn diff(old: Option<&Node>, new: Option<&Node>, path: &[usize]) -> Vec<Patch> {
    diff_with_config(&ReconcilerConfig::default(), old, new, path)
}

pub fn diff_with_config(
    config: &ReconcilerConfig,
    old: Option<&Node>,
    new: Option<&Node>,
    path: &[usize],
) -> Vec<Patch> {
    let mut engine = DiffEngine::new(config);
    engine.diff_node(old, new, path);
    let patches = engine.into_patches();
    log::debug!("diff at {:?}: {} patches", path, patches.len());
    patches
}

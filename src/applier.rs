//! Patch applier: replays a patch list against a live output tree
//!
//! The live tree is reached through a [`Backend`], which supplies node
//! materialization and a handful of child-list and attribute primitives.
//! Each patch is applied on its own; a patch that fails (stale path,
//! rejected operation) is skipped with a warning and the batch carries on.
use crate::errors::ReconcilerError;
use crate::types::{Handler, Node, Patch, PatchAction, Path, PropValue};
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

/// One attribute-level change, already classified for the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum PropOp<'a> {
    SetAttribute { name: &'a str, value: String },
    RemoveAttribute { name: &'a str },
    SetClass(&'a str),
    ClearClass,
    SetStyle(&'a str),
    ClearStyle,
    AddListener { event: String, handler: &'a Handler },
    RemoveListener { event: String, handler: &'a Handler },
}

/// `onClick` -> `click`. Names that are not handler-shaped yield `None`.
pub fn event_name(prop: &str) -> Option<String> {
    let rest = prop.strip_prefix("on")?;
    let first = rest.chars().next()?;
    first.is_ascii_alphabetic().then(|| rest.to_ascii_lowercase())
}

fn is_class(name: &str) -> bool {
    name == "class" || name == "className"
}

/// Translate `name: old -> new` into backend operations.
///
/// Listener changes remove the old handler before adding the new one so a
/// re-bound handler is never attached twice.
pub fn prop_ops<'a>(name: &'a str, old: Option<&'a PropValue>, new: Option<&'a PropValue>) -> Vec<PropOp<'a>> {
    if let Some(event) = event_name(name) {
        let old_handler = old.and_then(PropValue::as_handler);
        let new_handler = new.and_then(PropValue::as_handler);
        if old_handler.is_some() || new_handler.is_some() {
            let mut ops = Vec::with_capacity(2);
            match (old_handler, old) {
                (Some(handler), _) => ops.push(PropOp::RemoveListener { event: event.clone(), handler }),
                (None, Some(_)) => ops.push(PropOp::RemoveAttribute { name }),
                (None, None) => {}
            }
            match (new_handler, new) {
                (Some(handler), _) => ops.push(PropOp::AddListener { event, handler }),
                (None, Some(value)) => ops.extend(value_ops(name, value)),
                (None, None) => {}
            }
            return ops;
        }
    }
    match new {
        None if is_class(name) => vec![PropOp::ClearClass],
        None if name == "style" => vec![PropOp::ClearStyle],
        None => vec![PropOp::RemoveAttribute { name }],
        Some(value) => value_ops(name, value),
    }
}

fn value_ops<'a>(name: &'a str, value: &'a PropValue) -> Vec<PropOp<'a>> {
    match value {
        PropValue::Bool(true) => vec![PropOp::SetAttribute { name, value: String::new() }],
        PropValue::Bool(false) if is_class(name) => vec![PropOp::ClearClass],
        PropValue::Bool(false) if name == "style" => vec![PropOp::ClearStyle],
        PropValue::Bool(false) => vec![PropOp::RemoveAttribute { name }],
        PropValue::Str(s) if is_class(name) => vec![PropOp::SetClass(s)],
        PropValue::Str(s) if name == "style" => vec![PropOp::SetStyle(s)],
        // A handler on a name that is not `on*` has no attribute form.
        PropValue::Handler(_) => Vec::new(),
        other => vec![PropOp::SetAttribute { name, value: other.to_string() }],
    }
}

/// Output backend primitives the applier is written against.
pub trait Backend {
    type Handle: Copy + Eq + Hash + fmt::Debug;

    /// Materialize a canonical node (and its subtree) as a detached live node.
    fn create_node(&mut self, node: &Node) -> Result<Self::Handle, ReconcilerError>;

    fn children(&self, parent: Self::Handle) -> Result<Vec<Self::Handle>, ReconcilerError>;

    /// Child of `parent` at `index`, if there is one.
    fn child_at(&self, parent: Self::Handle, index: usize) -> Result<Option<Self::Handle>, ReconcilerError> {
        Ok(self.children(parent)?.get(index).copied())
    }

    fn child_count(&self, parent: Self::Handle) -> Result<usize, ReconcilerError> {
        Ok(self.children(parent)?.len())
    }

    /// Insert a detached node at `index` (`index == len` appends).
    fn insert_child(&mut self, parent: Self::Handle, index: usize, child: Self::Handle) -> Result<(), ReconcilerError>;

    /// Detach and return the child at `index`.
    fn remove_child(&mut self, parent: Self::Handle, index: usize) -> Result<Self::Handle, ReconcilerError>;

    /// Put `child` at `index`, detaching and returning the previous occupant.
    fn replace_child(
        &mut self,
        parent: Self::Handle,
        index: usize,
        child: Self::Handle,
    ) -> Result<Self::Handle, ReconcilerError>;

    /// Reposition an attached child; `to` indexes the list after removal from `from`.
    fn move_child(&mut self, parent: Self::Handle, from: usize, to: usize) -> Result<(), ReconcilerError>;

    fn update_prop(&mut self, node: Self::Handle, op: PropOp<'_>) -> Result<(), ReconcilerError>;

    /// Free a detached node and its subtree. Attached nodes are left alone.
    fn release(&mut self, _node: Self::Handle) {}
}

/// Where a canonical root is rendered: the container plus the root's shape.
///
/// A single root node is the container's only child; a forest root spreads
/// its children directly into the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mount<H> {
    pub container: H,
    pub forest: bool,
}

impl<H: Copy + Eq + Hash + fmt::Debug> Mount<H> {
    pub fn new(container: H) -> Self {
        Mount { container, forest: false }
    }

    /// Materialize `node` into an empty container.
    pub fn render<B: Backend<Handle = H>>(backend: &mut B, container: H, node: Option<&Node>) -> Result<Self, ReconcilerError> {
        let mut mount = Mount::new(container);
        if let Some(node) = node {
            mount.forest = matches!(node, Node::Forest { .. });
            insert_nodes(backend, container, 0, node)?;
        }
        Ok(mount)
    }
}

/// Insert a node at `index`, spreading a forest's children.
fn insert_nodes<B: Backend>(backend: &mut B, parent: B::Handle, index: usize, node: &Node) -> Result<(), ReconcilerError> {
    for (offset, child) in node.as_siblings().iter().enumerate() {
        let live = backend.create_node(child)?;
        backend.insert_child(parent, index + offset, live)?;
    }
    Ok(())
}

#[derive(Debug)]
pub struct PatchWarning {
    pub index: usize,
    pub action: PatchAction,
    pub path: Path,
    pub error: ReconcilerError,
}

impl fmt::Display for PatchWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "patch #{} {} at {:?} skipped: {}", self.index, self.action, self.path, self.error)
    }
}

#[derive(Debug, Default)]
pub struct ApplyReport {
    pub applied: usize,
    pub warnings: Vec<PatchWarning>,
}

impl ApplyReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Applies one diff's patch list. `Move` sources refer to each parent's
/// child list as it stood before the batch changed it, so one applier
/// serves exactly one patch list.
///
/// Nodes detached during the batch stay alive until it ends, since a later
/// `Move` may re-insert them. Whatever is still detached is then released.
pub struct PatchApplier<'b, B: Backend> {
    backend: &'b mut B,
    snapshots: HashMap<B::Handle, Vec<B::Handle>>,
    detached: Vec<B::Handle>,
}

impl<'b, B: Backend> PatchApplier<'b, B> {
    pub fn new(backend: &'b mut B) -> Self {
        PatchApplier {
            backend,
            snapshots: HashMap::new(),
            detached: Vec::new(),
        }
    }

    pub fn apply(mut self, mount: &mut Mount<B::Handle>, patches: impl IntoIterator<Item = Patch>) -> ApplyReport {
        let mut report = ApplyReport::default();
        for (index, patch) in patches.into_iter().enumerate() {
            log::trace!("apply #{}: {:?}", index, patch);
            match self.apply_one(mount, &patch) {
                Ok(()) => report.applied += 1,
                Err(error) => {
                    let warning = PatchWarning {
                        index,
                        action: patch.action(),
                        path: patch.path().to_vec(),
                        error,
                    };
                    log::warn!("{}", warning);
                    report.warnings.push(warning);
                }
            }
        }
        let released = self.detached.len();
        for node in self.detached.drain(..) {
            self.backend.release(node);
        }
        log::debug!(
            "apply: {} applied, {} skipped, {} detached nodes released",
            report.applied,
            report.warnings.len(),
            released
        );
        report
    }

    fn apply_one(&mut self, mount: &mut Mount<B::Handle>, patch: &Patch) -> Result<(), ReconcilerError> {
        match patch {
            // Bail-out form: the child list of the node at `path` is swapped wholesale.
            Patch::Replace { path, node: Node::Forest { children } } => {
                let target = self.resolve(mount, path)?;
                self.snapshot(target)?;
                let live = self.materialize(children)?;
                self.clear(target)?;
                self.attach(target, 0, live)
            }
            _ if patch.path().is_empty() => self.apply_at_root(mount, patch),
            Patch::Create { path, node } => {
                let (parent, index) = self.resolve_slot(mount, path)?;
                self.snapshot(parent)?;
                let len = self.backend.child_count(parent)?;
                if index > len {
                    return Err(ReconcilerError::IndexOutOfBounds { index, len });
                }
                let live = self.materialize(node.as_siblings())?;
                self.attach(parent, index, live)
            }
            Patch::Remove { path } => {
                let (parent, index) = self.resolve_slot(mount, path)?;
                self.snapshot(parent)?;
                let removed = self.backend.remove_child(parent, index)?;
                self.detached.push(removed);
                Ok(())
            }
            Patch::Replace { path, node } => {
                let (parent, index) = self.resolve_slot(mount, path)?;
                self.snapshot(parent)?;
                let live = self.backend.create_node(node)?;
                self.swap_in(parent, index, live)
            }
            Patch::UpdateProp { path, name, old, new } => {
                let target = self.resolve(mount, path)?;
                self.update_prop(target, name, old.as_ref(), new.as_ref())
            }
            Patch::Move { path, from, to } => {
                let (parent, _) = self.resolve_slot(mount, path)?;
                self.move_child(parent, *from, *to)
            }
        }
    }

    fn apply_at_root(&mut self, mount: &mut Mount<B::Handle>, patch: &Patch) -> Result<(), ReconcilerError> {
        let container = mount.container;
        match patch {
            Patch::Create { node, .. } | Patch::Replace { node, .. } => {
                self.snapshot(container)?;
                let live = self.materialize(node.as_siblings())?;
                self.clear(container)?;
                mount.forest = matches!(node, Node::Forest { .. });
                self.attach(container, 0, live)
            }
            Patch::Remove { .. } => {
                self.snapshot(container)?;
                self.clear(container)?;
                mount.forest = false;
                Ok(())
            }
            Patch::UpdateProp { name, old, new, .. } if !mount.forest => {
                let root = self.resolve(mount, &[])?;
                self.update_prop(root, name, old.as_ref(), new.as_ref())
            }
            other => Err(ReconcilerError::InvalidAtRoot {
                action: other.action().to_string(),
            }),
        }
    }

    fn update_prop(
        &mut self,
        target: B::Handle,
        name: &str,
        old: Option<&PropValue>,
        new: Option<&PropValue>,
    ) -> Result<(), ReconcilerError> {
        for op in prop_ops(name, old, new) {
            self.backend.update_prop(target, op)?;
        }
        Ok(())
    }

    /// Swap the node that started the batch at `from` into slot `to`. A node
    /// detached earlier in the batch is re-inserted in place of the occupant.
    fn move_child(&mut self, parent: B::Handle, from: usize, to: usize) -> Result<(), ReconcilerError> {
        self.snapshot(parent)?;
        let moving = self
            .snapshots
            .get(&parent)
            .and_then(|snapshot| snapshot.get(from))
            .copied()
            .ok_or(ReconcilerError::MoveSourceMissing { from })?;
        let current = self.backend.children(parent)?;
        if to >= current.len() {
            return Err(ReconcilerError::IndexOutOfBounds { index: to, len: current.len() });
        }
        match current.iter().position(|&h| h == moving) {
            Some(at) if at == to => Ok(()),
            Some(at) if at > to => {
                self.backend.move_child(parent, at, to)?;
                self.backend.move_child(parent, to + 1, at)
            }
            Some(at) => {
                self.backend.move_child(parent, at, to)?;
                self.backend.move_child(parent, to - 1, at)
            }
            None => self.swap_in(parent, to, moving),
        }
    }

    /// Create detached live nodes for `nodes`. Nothing is attached, so a
    /// failure part way leaves the live tree untouched.
    fn materialize(&mut self, nodes: &[Node]) -> Result<Vec<B::Handle>, ReconcilerError> {
        let mut live = Vec::with_capacity(nodes.len());
        for node in nodes {
            match self.backend.create_node(node) {
                Ok(handle) => live.push(handle),
                Err(error) => {
                    self.detached.extend(live);
                    return Err(error);
                }
            }
        }
        Ok(live)
    }

    /// Insert detached nodes under `parent` starting at `index`.
    fn attach(&mut self, parent: B::Handle, index: usize, live: Vec<B::Handle>) -> Result<(), ReconcilerError> {
        let mut pending = live.into_iter();
        let mut at = index;
        while let Some(handle) = pending.next() {
            if let Err(error) = self.backend.insert_child(parent, at, handle) {
                self.detached.push(handle);
                self.detached.extend(pending);
                return Err(error);
            }
            at += 1;
        }
        Ok(())
    }

    fn swap_in(&mut self, parent: B::Handle, index: usize, live: B::Handle) -> Result<(), ReconcilerError> {
        match self.backend.replace_child(parent, index, live) {
            Ok(previous) => {
                self.detached.push(previous);
                Ok(())
            }
            Err(error) => {
                self.detached.push(live);
                Err(error)
            }
        }
    }

    fn clear(&mut self, parent: B::Handle) -> Result<(), ReconcilerError> {
        let count = self.backend.child_count(parent)?;
        for index in (0..count).rev() {
            let removed = self.backend.remove_child(parent, index)?;
            self.detached.push(removed);
        }
        Ok(())
    }

    fn snapshot(&mut self, parent: B::Handle) -> Result<(), ReconcilerError> {
        if !self.snapshots.contains_key(&parent) {
            let children = self.backend.children(parent)?;
            self.snapshots.insert(parent, children);
        }
        Ok(())
    }

    /// Live node at a canonical path.
    fn resolve(&self, mount: &Mount<B::Handle>, path: &[usize]) -> Result<B::Handle, ReconcilerError> {
        let mut current = if mount.forest {
            mount.container
        } else {
            self.child_at(mount.container, 0, path)?
        };
        for &index in path {
            current = self.child_at(current, index, path)?;
        }
        Ok(current)
    }

    /// Parent handle and child index addressed by a non-empty path.
    fn resolve_slot(&self, mount: &Mount<B::Handle>, path: &[usize]) -> Result<(B::Handle, usize), ReconcilerError> {
        let (&index, parent_path) = path
            .split_last()
            .ok_or_else(|| ReconcilerError::PathNotFound { path: Vec::new() })?;
        Ok((self.resolve(mount, parent_path)?, index))
    }

    fn child_at(&self, parent: B::Handle, index: usize, path: &[usize]) -> Result<B::Handle, ReconcilerError> {
        self.backend
            .child_at(parent, index)?
            .ok_or_else(|| ReconcilerError::PathNotFound { path: path.to_vec() })
    }
}

/// Apply `patches` to the tree rendered at `mount`, in order.
pub fn apply<B: Backend>(backend: &mut B, mount: &mut Mount<B::Handle>, patches: impl IntoIterator<Item = Patch>) -> ApplyReport {
    PatchApplier::new(backend).apply(mount, patches)
}

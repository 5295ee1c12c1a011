//! In-memory browser-like document implementing the output backend
use crate::applier::{Backend, PropOp, prop_ops};
use crate::errors::ReconcilerError;
use crate::html_generator;
use crate::types::{Element, Handler, Node};
use indexmap::IndexMap;
use std::fmt;

/// Handle to a node in a [`Document`]: a slot index plus the slot's
/// generation. A released slot is reused under the next generation, so an
/// old handle never reaches the node that took its place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LiveId {
    index: usize,
    generation: u32,
}

impl fmt::Display for LiveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "live_{}.{}", self.index, self.generation)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveKind {
    Container,
    Element(String),
    Text(String),
}

#[derive(Debug)]
pub struct LiveNode {
    pub kind: LiveKind,
    pub attributes: IndexMap<String, String>,
    pub class_list: Vec<String>,
    pub style: IndexMap<String, String>,
    pub listeners: IndexMap<String, Vec<Handler>>,
    pub children: Vec<LiveId>,
    pub parent: Option<LiveId>,
}

impl LiveNode {
    fn new(kind: LiveKind) -> Self {
        LiveNode {
            kind,
            attributes: IndexMap::new(),
            class_list: Vec::new(),
            style: IndexMap::new(),
            listeners: IndexMap::new(),
            children: Vec::new(),
            parent: None,
        }
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    node: Option<LiveNode>,
}

/// Arena of live nodes under a single root container.
#[derive(Debug)]
pub struct Document {
    slots: Vec<Slot>,
    free: Vec<usize>,
    root: LiveId,
    focused: Option<LiveId>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Document {
            slots: vec![Slot {
                generation: 0,
                node: Some(LiveNode::new(LiveKind::Container)),
            }],
            free: Vec::new(),
            root: LiveId { index: 0, generation: 0 },
            focused: None,
        }
    }

    fn get(&self, id: LiveId) -> Option<&LiveNode> {
        self.slots
            .get(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    pub fn root(&self) -> LiveId {
        self.root
    }

    pub fn node(&self, id: LiveId) -> Result<&LiveNode, ReconcilerError> {
        self.get(id).ok_or_else(|| ReconcilerError::UnknownNode { node: id.to_string() })
    }

    fn node_mut(&mut self, id: LiveId) -> Result<&mut LiveNode, ReconcilerError> {
        self.slots
            .get_mut(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
            .ok_or_else(|| ReconcilerError::UnknownNode { node: id.to_string() })
    }

    fn element_mut(&mut self, id: LiveId) -> Result<&mut LiveNode, ReconcilerError> {
        let node = self.node_mut(id)?;
        match node.kind {
            LiveKind::Element(_) => Ok(node),
            _ => Err(ReconcilerError::NotAnElement { node: id.to_string() }),
        }
    }

    pub fn child_ids(&self, id: LiveId) -> &[LiveId] {
        self.get(id).map_or(&[], |n| n.children.as_slice())
    }

    pub fn parent(&self, id: LiveId) -> Option<LiveId> {
        self.get(id).and_then(|n| n.parent)
    }

    pub fn tag(&self, id: LiveId) -> Option<&str> {
        match &self.get(id)?.kind {
            LiveKind::Element(tag) => Some(tag),
            _ => None,
        }
    }

    pub fn text(&self, id: LiveId) -> Option<&str> {
        match &self.get(id)?.kind {
            LiveKind::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn attribute(&self, id: LiveId, name: &str) -> Option<&str> {
        self.get(id)?.attributes.get(name).map(String::as_str)
    }

    pub fn class_list(&self, id: LiveId) -> &[String] {
        self.get(id).map_or(&[], |n| n.class_list.as_slice())
    }

    pub fn style_value(&self, id: LiveId, property: &str) -> Option<&str> {
        self.get(id)?.style.get(property).map(String::as_str)
    }

    pub fn listener_count(&self, id: LiveId, event: &str) -> usize {
        self.get(id)
            .and_then(|n| n.listeners.get(event))
            .map_or(0, Vec::len)
    }

    /// Run every listener bound for `event` on `id`; returns how many ran.
    pub fn dispatch(&self, id: LiveId, event: &str) -> usize {
        let Some(handlers) = self.get(id).and_then(|n| n.listeners.get(event)) else {
            return 0;
        };
        for handler in handlers {
            handler.call(event);
        }
        handlers.len()
    }

    pub fn focus(&mut self, id: LiveId) {
        self.focused = Some(id);
    }

    pub fn focused(&self) -> Option<LiveId> {
        self.focused
    }

    /// True when `id` is reachable from the root container.
    pub fn is_attached(&self, id: LiveId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == self.root {
                return true;
            }
            current = self.parent(node);
        }
        false
    }

    /// Nodes currently allocated, attached or not.
    pub fn live_count(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Arena slots ever allocated. Grows only when no released slot is free.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn inner_html(&self, id: LiveId) -> String {
        html_generator::inner_html(self, id)
    }

    pub fn outer_html(&self, id: LiveId) -> String {
        html_generator::outer_html(self, id)
    }

    fn alloc(&mut self, kind: LiveKind) -> LiveId {
        let node = Some(LiveNode::new(kind));
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index];
            slot.node = node;
            return LiveId { index, generation: slot.generation };
        }
        self.slots.push(Slot { generation: 0, node });
        LiveId { index: self.slots.len() - 1, generation: 0 }
    }

    /// Drop a detached subtree and hand its slots back to the arena.
    fn free_subtree(&mut self, id: LiveId) -> usize {
        let mut pending = vec![id];
        let mut freed = 0;
        while let Some(next) = pending.pop() {
            let Some(slot) = self
                .slots
                .get_mut(next.index)
                .filter(|slot| slot.generation == next.generation)
            else {
                continue;
            };
            if let Some(node) = slot.node.take() {
                slot.generation = slot.generation.wrapping_add(1);
                pending.extend(node.children);
                self.free.push(next.index);
                freed += 1;
                if self.focused == Some(next) {
                    self.focused = None;
                }
            }
        }
        freed
    }

    fn materialize_element(&mut self, element: &Element) -> Result<LiveId, ReconcilerError> {
        let id = self.alloc(LiveKind::Element(element.tag.clone()));
        if let Err(error) = self.fill_element(id, element) {
            self.free_subtree(id);
            return Err(error);
        }
        Ok(id)
    }

    fn fill_element(&mut self, id: LiveId, element: &Element) -> Result<(), ReconcilerError> {
        for (name, value) in &element.props {
            for op in prop_ops(name, None, Some(value)) {
                self.update_prop(id, op)?;
            }
        }
        for child in &element.children {
            let child_id = self.create_node(child)?;
            let index = self.child_ids(id).len();
            self.insert_child(id, index, child_id)?;
        }
        Ok(())
    }

    fn detach(&mut self, id: LiveId) {
        if let Ok(node) = self.node_mut(id) {
            node.parent = None;
        }
        if self.focused.is_some_and(|f| !self.is_attached(f)) {
            self.focused = None;
        }
    }

    fn check_detached(&self, child: LiveId) -> Result<(), ReconcilerError> {
        if child == self.root || self.node(child)?.parent.is_some() {
            return Err(ReconcilerError::UnknownNode {
                node: format!("{child} (already attached)"),
            });
        }
        Ok(())
    }
}

fn parse_style(raw: &str) -> IndexMap<String, String> {
    raw.split(';')
        .filter_map(|decl| {
            let (property, value) = decl.split_once(':')?;
            let property = property.trim();
            (!property.is_empty()).then(|| (property.to_string(), value.trim().to_string()))
        })
        .collect()
}

impl Backend for Document {
    type Handle = LiveId;

    fn create_node(&mut self, node: &Node) -> Result<LiveId, ReconcilerError> {
        match node {
            Node::Text { text } => Ok(self.alloc(LiveKind::Text(text.clone()))),
            Node::Element(element) => self.materialize_element(element),
            Node::Forest { .. } => Err(ReconcilerError::ForestNotMaterializable),
        }
    }

    fn children(&self, parent: LiveId) -> Result<Vec<LiveId>, ReconcilerError> {
        Ok(self.node(parent)?.children.clone())
    }

    fn child_at(&self, parent: LiveId, index: usize) -> Result<Option<LiveId>, ReconcilerError> {
        Ok(self.node(parent)?.children.get(index).copied())
    }

    fn child_count(&self, parent: LiveId) -> Result<usize, ReconcilerError> {
        Ok(self.node(parent)?.children.len())
    }

    fn insert_child(&mut self, parent: LiveId, index: usize, child: LiveId) -> Result<(), ReconcilerError> {
        self.check_detached(child)?;
        let node = self.node_mut(parent)?;
        if matches!(node.kind, LiveKind::Text(_)) {
            return Err(ReconcilerError::NotAnElement { node: parent.to_string() });
        }
        let len = node.children.len();
        if index > len {
            return Err(ReconcilerError::IndexOutOfBounds { index, len });
        }
        node.children.insert(index, child);
        self.node_mut(child)?.parent = Some(parent);
        Ok(())
    }

    fn remove_child(&mut self, parent: LiveId, index: usize) -> Result<LiveId, ReconcilerError> {
        let node = self.node_mut(parent)?;
        let len = node.children.len();
        if index >= len {
            return Err(ReconcilerError::IndexOutOfBounds { index, len });
        }
        let child = node.children.remove(index);
        self.detach(child);
        Ok(child)
    }

    fn replace_child(&mut self, parent: LiveId, index: usize, child: LiveId) -> Result<LiveId, ReconcilerError> {
        self.check_detached(child)?;
        let node = self.node_mut(parent)?;
        let len = node.children.len();
        let Some(slot) = node.children.get_mut(index) else {
            return Err(ReconcilerError::IndexOutOfBounds { index, len });
        };
        let previous = std::mem::replace(slot, child);
        self.node_mut(child)?.parent = Some(parent);
        self.detach(previous);
        Ok(previous)
    }

    fn move_child(&mut self, parent: LiveId, from: usize, to: usize) -> Result<(), ReconcilerError> {
        let node = self.node_mut(parent)?;
        let len = node.children.len();
        if from >= len || to >= len {
            return Err(ReconcilerError::IndexOutOfBounds { index: from.max(to), len });
        }
        let child = node.children.remove(from);
        node.children.insert(to, child);
        Ok(())
    }

    fn update_prop(&mut self, id: LiveId, op: PropOp<'_>) -> Result<(), ReconcilerError> {
        let node = self.element_mut(id)?;
        match op {
            PropOp::SetAttribute { name, value } => {
                node.attributes.insert(name.to_string(), value);
            }
            PropOp::RemoveAttribute { name } => {
                node.attributes.shift_remove(name);
            }
            PropOp::SetClass(classes) => {
                node.class_list = classes.split_whitespace().map(String::from).collect();
            }
            PropOp::ClearClass => node.class_list.clear(),
            PropOp::SetStyle(raw) => node.style = parse_style(raw),
            PropOp::ClearStyle => node.style.clear(),
            PropOp::AddListener { event, handler } => {
                node.listeners.entry(event).or_default().push(handler.clone());
            }
            PropOp::RemoveListener { event, handler } => {
                if let Some(bound) = node.listeners.get_mut(&event) {
                    bound.retain(|h| h != handler);
                    if bound.is_empty() {
                        node.listeners.shift_remove(&event);
                    }
                }
            }
        }
        Ok(())
    }

    fn release(&mut self, id: LiveId) {
        if id == self.root || self.get(id).is_none_or(|node| node.parent.is_some()) {
            return;
        }
        let freed = self.free_subtree(id);
        log::trace!("document: released {} ({} nodes)", id, freed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PropValue;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn materializes_props_through_classification() {
        let mut doc = Document::new();
        let button = Element::new("button")
            .with_prop("className", "primary wide")
            .with_prop("style", "color: red; margin: 0")
            .with_prop("disabled", true)
            .with_prop("hidden", false)
            .with_prop("tabindex", 2);
        let id = doc.create_node(&button.into()).unwrap();
        assert_eq!(doc.class_list(id), ["primary", "wide"]);
        assert_eq!(doc.style_value(id, "margin"), Some("0"));
        assert_eq!(doc.attribute(id, "disabled"), Some(""));
        assert_eq!(doc.attribute(id, "hidden"), None);
        assert_eq!(doc.attribute(id, "tabindex"), Some("2"));
    }

    #[test]
    fn listeners_dispatch_once() {
        let hits = Rc::new(Cell::new(0));
        let counter = hits.clone();
        let handler = Handler::new("inc", move |_| counter.set(counter.get() + 1));
        let mut doc = Document::new();
        let el = Element::new("a").with_prop("onClick", PropValue::Handler(handler));
        let id = doc.create_node(&el.into()).unwrap();
        assert_eq!(doc.dispatch(id, "click"), 1);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn attached_nodes_cannot_be_inserted_twice() {
        let mut doc = Document::new();
        let root = doc.root();
        let id = doc.create_node(&Node::text("x")).unwrap();
        doc.insert_child(root, 0, id).unwrap();
        assert!(doc.insert_child(root, 1, id).is_err());
    }

    #[test]
    fn text_nodes_reject_props() {
        let mut doc = Document::new();
        let id = doc.create_node(&Node::text("x")).unwrap();
        let err = doc.update_prop(id, PropOp::ClearClass).unwrap_err();
        assert!(matches!(err, ReconcilerError::NotAnElement { .. }));
    }

    #[test]
    fn removing_focused_node_clears_focus() {
        let mut doc = Document::new();
        let root = doc.root();
        let id = doc.create_node(&Element::new("input").into()).unwrap();
        doc.insert_child(root, 0, id).unwrap();
        doc.focus(id);
        doc.remove_child(root, 0).unwrap();
        assert_eq!(doc.focused(), None);
        assert!(!doc.is_attached(id));
    }

    #[test]
    fn released_slots_are_reused_under_a_new_generation() {
        let mut doc = Document::new();
        let root = doc.root();
        let list = Element::new("ul").with_child(Element::new("li").with_child(Node::text("a")).into());
        let old = doc.create_node(&list.into()).unwrap();
        doc.insert_child(root, 0, old).unwrap();
        assert_eq!(doc.live_count(), 4);

        doc.remove_child(root, 0).unwrap();
        doc.release(old);
        assert_eq!(doc.live_count(), 1);
        assert!(matches!(doc.node(old), Err(ReconcilerError::UnknownNode { .. })));

        let fresh = doc.create_node(&Node::text("b")).unwrap();
        assert_ne!(fresh, old);
        assert_eq!(doc.slot_count(), 4);
        assert_eq!(doc.text(old), None);
        assert_eq!(doc.text(fresh), Some("b"));
    }

    #[test]
    fn attached_nodes_are_not_released() {
        let mut doc = Document::new();
        let root = doc.root();
        let id = doc.create_node(&Node::text("x")).unwrap();
        doc.insert_child(root, 0, id).unwrap();
        doc.release(id);
        doc.release(root);
        assert_eq!(doc.text(id), Some("x"));
        assert_eq!(doc.live_count(), 2);
    }

    #[test]
    fn releasing_drops_listener_closures() {
        let counter = Rc::new(Cell::new(0));
        let captured = counter.clone();
        let handler = Handler::new("inc", move |_| captured.set(captured.get() + 1));
        let mut doc = Document::new();
        let id = doc.create_node(&Element::new("a").with_prop("onClick", handler).into()).unwrap();
        assert_eq!(Rc::strong_count(&counter), 2);
        doc.release(id);
        assert_eq!(Rc::strong_count(&counter), 1);
    }
}

//! Canonical node model and the patch vocabulary
use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use std::fmt;
use std::rc::Rc;
use uuid::Uuid;

/// Child-index path from the root to a node. The `children` hop is implicit.
pub type Path = Vec<usize>;

/// Ordered attribute mapping of an element.
pub type Props = IndexMap<String, PropValue>;

/// Shared callback behind an event handler prop.
type Callback = Rc<dyn Fn(&str)>;

/// Event-handler reference carried as a prop value.
///
/// Two handlers are equal only when they are clones of the same reference,
/// so re-rendering with the same `Handler` produces no prop patch.
#[derive(Clone)]
pub struct Handler {
    id: Uuid,
    name: Rc<str>,
    callback: Callback,
}

impl Handler {
    pub fn new(name: impl Into<String>, callback: impl Fn(&str) + 'static) -> Self {
        let name: String = name.into();
        Handler {
            id: Uuid::new_v4(),
            name: Rc::from(name),
            callback: Rc::new(callback),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoke the callback with the dispatched event name.
    pub fn call(&self, event: &str) {
        (self.callback)(event)
    }
}

impl PartialEq for Handler {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handler({}, {})", self.name, self.id)
    }
}

impl Serialize for Handler {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.name)
    }
}

/// Attribute value of an element.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PropValue {
    Str(String),
    Bool(bool),
    Num(f64),
    Handler(Handler),
}

impl PropValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_handler(&self) -> Option<&Handler> {
        match self {
            PropValue::Handler(h) => Some(h),
            _ => None,
        }
    }
}

impl fmt::Display for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropValue::Str(s) => f.write_str(s),
            PropValue::Bool(b) => write!(f, "{b}"),
            PropValue::Num(n) => f.write_str(&format_number(*n)),
            PropValue::Handler(h) => f.write_str(h.name()),
        }
    }
}

impl From<&str> for PropValue {
    fn from(s: &str) -> Self {
        PropValue::Str(s.to_string())
    }
}

impl From<String> for PropValue {
    fn from(s: String) -> Self {
        PropValue::Str(s)
    }
}

impl From<bool> for PropValue {
    fn from(b: bool) -> Self {
        PropValue::Bool(b)
    }
}

impl From<f64> for PropValue {
    fn from(n: f64) -> Self {
        PropValue::Num(n)
    }
}

impl From<i64> for PropValue {
    fn from(n: i64) -> Self {
        PropValue::Num(n as f64)
    }
}

impl From<i32> for PropValue {
    fn from(n: i32) -> Self {
        PropValue::Num(f64::from(n))
    }
}

impl From<Handler> for PropValue {
    fn from(h: Handler) -> Self {
        PropValue::Handler(h)
    }
}

/// Render a number the way text content shows it: integral values drop the fraction.
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// Author-supplied sibling identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum Key {
    Str(String),
    Num(i64),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Str(s) => f.write_str(s),
            Key::Num(n) => write!(f, "{n}"),
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Str(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Str(s)
    }
}

impl From<i64> for Key {
    fn from(n: i64) -> Self {
        Key::Num(n)
    }
}

impl From<i32> for Key {
    fn from(n: i32) -> Self {
        Key::Num(i64::from(n))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Element,
    Text,
    Forest,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Element {
    #[serde(rename = "type")]
    pub tag: String,
    pub props: Props,
    pub children: Vec<Node>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<Key>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Element {
            tag: tag.into(),
            props: Props::new(),
            children: Vec::new(),
            key: None,
        }
    }

    pub fn with_prop(mut self, name: impl Into<String>, value: impl Into<PropValue>) -> Self {
        self.props.insert(name.into(), value.into());
        self
    }

    pub fn with_child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_key(mut self, key: impl Into<Key>) -> Self {
        self.key = Some(key.into());
        self
    }
}

/// One renderable unit after normalization. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    Element(Element),
    Text { text: String },
    Forest { children: Vec<Node> },
}

impl Node {
    pub fn text(text: impl Into<String>) -> Self {
        Node::Text { text: text.into() }
    }

    pub fn forest(children: Vec<Node>) -> Self {
        Node::Forest { children }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Element(_) => NodeKind::Element,
            Node::Text { .. } => NodeKind::Text,
            Node::Forest { .. } => NodeKind::Forest,
        }
    }

    pub fn key(&self) -> Option<&Key> {
        match self {
            Node::Element(el) => el.key.as_ref(),
            _ => None,
        }
    }

    /// Child sequence the node contributes to a sibling list: a forest's own
    /// children, or the node itself.
    pub fn as_siblings(&self) -> &[Node] {
        match self {
            Node::Forest { children } => children,
            other => std::slice::from_ref(other),
        }
    }

    /// Concatenated text of the node and its descendants.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        match self {
            Node::Text { text } => out.push_str(text),
            Node::Element(Element { children, .. }) | Node::Forest { children } => {
                for child in children {
                    child.collect_text(out);
                }
            }
        }
    }
}

impl From<Element> for Node {
    fn from(el: Element) -> Self {
        Node::Element(el)
    }
}

/// Patch action names, as used in logs and warnings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchAction {
    Create,
    Remove,
    Replace,
    UpdateProp,
    Move,
}

impl fmt::Display for PatchAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PatchAction::Create => "CREATE",
            PatchAction::Remove => "REMOVE",
            PatchAction::Replace => "REPLACE",
            PatchAction::UpdateProp => "UPDATE_PROP",
            PatchAction::Move => "MOVE",
        };
        f.write_str(name)
    }
}

/// One atomic instruction for transforming a live output tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Patch {
    Create {
        path: Path,
        node: Node,
    },
    Remove {
        path: Path,
    },
    Replace {
        path: Path,
        node: Node,
    },
    UpdateProp {
        path: Path,
        name: String,
        old: Option<PropValue>,
        new: Option<PropValue>,
    },
    Move {
        path: Path,
        from: usize,
        to: usize,
    },
}

impl Patch {
    pub fn action(&self) -> PatchAction {
        match self {
            Patch::Create { .. } => PatchAction::Create,
            Patch::Remove { .. } => PatchAction::Remove,
            Patch::Replace { .. } => PatchAction::Replace,
            Patch::UpdateProp { .. } => PatchAction::UpdateProp,
            Patch::Move { .. } => PatchAction::Move,
        }
    }

    pub fn path(&self) -> &[usize] {
        match self {
            Patch::Create { path, .. }
            | Patch::Remove { path }
            | Patch::Replace { path, .. }
            | Patch::UpdateProp { path, .. }
            | Patch::Move { path, .. } => path,
        }
    }
}

/// `path` extended by one child index.
pub fn child_path(path: &[usize], index: usize) -> Path {
    let mut out = Vec::with_capacity(path.len() + 1);
    out.extend_from_slice(path);
    out.push(index);
    out
}

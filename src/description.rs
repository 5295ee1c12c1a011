//! Author-facing tree descriptions, before normalization
use crate::types::{Handler, Key, PropValue};
use indexmap::IndexMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

type Producer = Rc<dyn Fn() -> Result<Description, String>>;

/// Zero-argument producer standing in for a subtree.
#[derive(Clone)]
pub struct Deferred(Producer);

impl Deferred {
    pub fn new(produce: impl Fn() -> Description + 'static) -> Self {
        Deferred(Rc::new(move || Ok(produce())))
    }

    pub fn fallible<E: fmt::Display>(produce: impl Fn() -> Result<Description, E> + 'static) -> Self {
        Deferred(Rc::new(move || produce().map_err(|e| e.to_string())))
    }

    /// Run the producer. A panic is reported the same way as an `Err`.
    pub fn produce(&self) -> Result<Description, String> {
        match panic::catch_unwind(AssertUnwindSafe(|| (self.0)())) {
            Ok(result) => result,
            Err(payload) => Err(panic_message(payload.as_ref())),
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "producer panicked".to_string()
    }
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Deferred(<producer>)")
    }
}

/// Value of one entry in an element's attribute mapping.
#[derive(Debug, Clone)]
pub enum Attr {
    Value(PropValue),
    Tree(Description),
}

/// Attribute mapping of a `{tag: {...}}` element. `text` and `children`
/// are structural; every other entry becomes a prop.
#[derive(Debug, Clone, Default)]
pub struct Attributes {
    pub entries: IndexMap<String, Attr>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prop(mut self, name: impl Into<String>, value: impl Into<PropValue>) -> Self {
        self.entries.insert(name.into(), Attr::Value(value.into()));
        self
    }

    pub fn handler(self, name: impl Into<String>, handler: Handler) -> Self {
        self.prop(name, handler)
    }

    pub fn key(self, key: impl Into<Key>) -> Self {
        let value = match key.into() {
            Key::Str(s) => PropValue::Str(s),
            Key::Num(n) => PropValue::Num(n as f64),
        };
        self.prop("key", value)
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.entries.insert("text".into(), Attr::Value(PropValue::Str(text.into())));
        self
    }

    pub fn children(mut self, children: impl Into<Description>) -> Self {
        self.entries.insert("children".into(), Attr::Tree(children.into()));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Attr> {
        self.entries.get(name)
    }
}

/// What follows the tag name in `{tag: body}`.
#[derive(Debug, Clone)]
pub enum Body {
    /// Primitive body: the element's text content.
    Value(PropValue),
    Attributes(Attributes),
}

impl From<Attributes> for Body {
    fn from(attrs: Attributes) -> Self {
        Body::Attributes(attrs)
    }
}

impl From<&str> for Body {
    fn from(s: &str) -> Self {
        Body::Value(PropValue::Str(s.to_string()))
    }
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Body::Value(PropValue::Str(s))
    }
}

/// Tree description as supplied by the application.
#[derive(Debug, Clone, Default)]
pub enum Description {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    List(Vec<Description>),
    Deferred(Deferred),
    Tag { name: String, body: Body },
}

impl Description {
    pub fn tag(name: impl Into<String>, body: impl Into<Body>) -> Self {
        Description::Tag {
            name: name.into(),
            body: body.into(),
        }
    }

    pub fn deferred(produce: impl Fn() -> Description + 'static) -> Self {
        Description::Deferred(Deferred::new(produce))
    }

    pub fn fallible<E: fmt::Display>(produce: impl Fn() -> Result<Description, E> + 'static) -> Self {
        Description::Deferred(Deferred::fallible(produce))
    }

    pub fn list(items: impl IntoIterator<Item = Description>) -> Self {
        Description::List(items.into_iter().collect())
    }
}

impl From<&str> for Description {
    fn from(s: &str) -> Self {
        Description::Text(s.to_string())
    }
}

impl From<String> for Description {
    fn from(s: String) -> Self {
        Description::Text(s)
    }
}

impl From<f64> for Description {
    fn from(n: f64) -> Self {
        Description::Number(n)
    }
}

impl From<i64> for Description {
    fn from(n: i64) -> Self {
        Description::Number(n as f64)
    }
}

impl From<bool> for Description {
    fn from(b: bool) -> Self {
        Description::Bool(b)
    }
}

impl From<Vec<Description>> for Description {
    fn from(items: Vec<Description>) -> Self {
        Description::List(items)
    }
}

impl<T: Into<Description>> From<Option<T>> for Description {
    fn from(value: Option<T>) -> Self {
        value.map_or(Description::Empty, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panicking_producer_reports_message() {
        let deferred = Deferred::new(|| panic!("boom"));
        assert_eq!(deferred.produce().unwrap_err(), "boom");
    }

    #[test]
    fn fallible_producer_keeps_error_text() {
        let deferred = Deferred::fallible(|| Err::<Description, _>("no data"));
        assert_eq!(deferred.produce().unwrap_err(), "no data");
    }

    #[test]
    fn key_builder_stores_reserved_prop() {
        let attrs = Attributes::new().key(7);
        assert!(matches!(attrs.get("key"), Some(Attr::Value(PropValue::Num(n))) if *n == 7.0));
    }
}

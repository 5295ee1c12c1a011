//! Description -> canonical node conversion, bounded by a depth guard
use crate::config::{DEFAULT_MAX_DEPTH, ReconcilerConfig};
use crate::description::{Attr, Attributes, Body, Description};
use crate::types::{Element, Key, Node, PropValue, Props, format_number};

pub const DEPTH_EXCEEDED_TEXT: &str = "maximum depth exceeded";
pub const ERROR_CLASS: &str = "render-error";

/// Pure conversion from descriptions to canonical nodes.
#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
    max_depth: usize,
}

impl Default for Normalizer {
    fn default() -> Self {
        Normalizer::new(DEFAULT_MAX_DEPTH)
    }
}

impl Normalizer {
    pub fn new(max_depth: usize) -> Self {
        Normalizer { max_depth }
    }

    pub fn from_config(config: &ReconcilerConfig) -> Self {
        Normalizer::new(config.max_depth)
    }

    pub fn normalize(&self, description: &Description) -> Option<Node> {
        self.normalize_at(description, 0)
    }

    /// Normalize a description found `depth` levels below the root.
    ///
    /// A level is an element or a deferred producer. Lists are transparent,
    /// so `{div: {children: [..]}}` costs one level like `{div: {children: ..}}`.
    ///
    /// Returns `None` for descriptions that render nothing. Never fails:
    /// producer errors and runaway depth turn into placeholder spans.
    pub fn normalize_at(&self, description: &Description, depth: usize) -> Option<Node> {
        if depth > self.max_depth {
            log::warn!("normalize: depth {} exceeds maximum {}", depth, self.max_depth);
            return Some(depth_exceeded_placeholder());
        }
        match description {
            Description::Empty => None,
            Description::Text(s) if s.is_empty() => None,
            Description::Text(s) => Some(Node::text(s.clone())),
            Description::Number(n) => Some(Node::text(format_number(*n))),
            Description::Bool(b) => Some(Node::text(b.to_string())),
            Description::List(items) => {
                let mut children = Vec::with_capacity(items.len());
                for item in items {
                    self.push_flattened(item, depth, &mut children);
                }
                Some(Node::forest(children))
            }
            Description::Deferred(deferred) => match deferred.produce() {
                Ok(produced) => self.normalize_at(&produced, depth + 1),
                Err(message) => {
                    log::warn!("normalize: deferred producer failed: {}", message);
                    Some(error_placeholder(&message))
                }
            },
            Description::Tag { name, body } => Some(Node::Element(self.element(name, body, depth))),
        }
    }

    /// Normalize `description` and append it to `out`, splicing forests.
    fn push_flattened(&self, description: &Description, depth: usize, out: &mut Vec<Node>) {
        match self.normalize_at(description, depth) {
            None => {}
            Some(Node::Forest { children }) => out.extend(children),
            Some(node) => out.push(node),
        }
    }

    fn element(&self, tag: &str, body: &Body, depth: usize) -> Element {
        let mut element = Element::new(tag);
        match body {
            Body::Value(value) => {
                let text = value.to_string();
                if !text.is_empty() {
                    element.children.push(Node::text(text));
                }
            }
            Body::Attributes(attrs) => self.fill_from_attributes(&mut element, attrs, depth),
        }
        element
    }

    fn fill_from_attributes(&self, element: &mut Element, attrs: &Attributes, depth: usize) {
        let mut props = Props::new();
        for (name, attr) in &attrs.entries {
            match name.as_str() {
                "text" | "children" => {}
                "key" => match attr_key(attr) {
                    Some(key) => element.key = Some(key),
                    None => log::debug!("normalize: ignoring non-scalar key on <{}>", element.tag),
                },
                _ => {
                    if let Some(value) = self.attr_prop(attr, depth) {
                        props.insert(name.clone(), value);
                    }
                }
            }
        }
        element.props = props;

        if let Some(text) = attrs.get("text") {
            if let Some(text) = self.attr_text(text, depth) {
                element.children.push(Node::text(text));
            }
            return;
        }
        match attrs.get("children") {
            Some(Attr::Tree(children)) => self.push_flattened(children, depth + 1, &mut element.children),
            Some(Attr::Value(value)) => {
                let text = value.to_string();
                if !text.is_empty() {
                    element.children.push(Node::text(text));
                }
            }
            None => {}
        }
    }

    fn attr_prop(&self, attr: &Attr, depth: usize) -> Option<PropValue> {
        match attr {
            Attr::Value(value) => Some(value.clone()),
            Attr::Tree(tree) => self.normalize_at(tree, depth + 1).map(|node| PropValue::Str(node.text_content())),
        }
    }

    fn attr_text(&self, attr: &Attr, depth: usize) -> Option<String> {
        let text = match attr {
            Attr::Value(value) => value.to_string(),
            Attr::Tree(tree) => self.normalize_at(tree, depth + 1)?.text_content(),
        };
        (!text.is_empty()).then_some(text)
    }
}

fn attr_key(attr: &Attr) -> Option<Key> {
    match attr {
        Attr::Value(PropValue::Str(s)) => Some(Key::Str(s.clone())),
        Attr::Value(PropValue::Num(n)) if n.fract() == 0.0 && n.is_finite() => Some(Key::Num(*n as i64)),
        Attr::Value(PropValue::Num(n)) => Some(Key::Str(format_number(*n))),
        Attr::Tree(Description::Text(s)) => Some(Key::Str(s.clone())),
        Attr::Tree(Description::Number(n)) if n.fract() == 0.0 && n.is_finite() => Some(Key::Num(*n as i64)),
        _ => None,
    }
}

pub fn depth_exceeded_placeholder() -> Node {
    Element::new("span")
        .with_prop("class", ERROR_CLASS)
        .with_child(Node::text(DEPTH_EXCEEDED_TEXT))
        .into()
}

pub fn error_placeholder(message: &str) -> Node {
    Element::new("span")
        .with_prop("class", ERROR_CLASS)
        .with_child(Node::text(format!("render error: {message}")))
        .into()
}

/// Normalize with the default depth limit.
pub fn normalize(description: &Description, depth: usize) -> Option<Node> {
    Normalizer::default().normalize_at(description, depth)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeKind;
    use serde_json::json;

    fn norm(value: serde_json::Value) -> Option<Node> {
        normalize(&Description::from_json(&value).unwrap(), 0)
    }

    #[test]
    fn empty_descriptions_render_nothing() {
        assert_eq!(norm(json!(null)), None);
        assert_eq!(norm(json!("")), None);
    }

    #[test]
    fn primitives_become_text() {
        assert_eq!(norm(json!("hi")), Some(Node::text("hi")));
        assert_eq!(norm(json!(42)), Some(Node::text("42")));
        assert_eq!(norm(json!(false)), Some(Node::text("false")));
    }

    #[test]
    fn nested_lists_flatten_into_one_forest() {
        let node = norm(json!(["a", null, ["b", ["c"]]])).unwrap();
        assert_eq!(
            node,
            Node::forest(vec![Node::text("a"), Node::text("b"), Node::text("c")])
        );
    }

    #[test]
    fn text_attribute_short_circuits_children() {
        let node = norm(json!({"p": {"text": "t", "children": ["ignored"], "id": "x"}})).unwrap();
        let expected = Element::new("p").with_prop("id", "x").with_child(Node::text("t"));
        assert_eq!(node, Node::Element(expected));
    }

    #[test]
    fn child_arrays_splice_into_children() {
        let node = norm(json!({"ul": {"children": [{"li": "a"}, [{"li": "b"}]]}})).unwrap();
        let Node::Element(ul) = node else { panic!("expected element") };
        assert_eq!(ul.children.len(), 2);
        assert!(ul.children.iter().all(|c| c.kind() == NodeKind::Element));
    }

    #[test]
    fn key_is_lifted_out_of_props() {
        let node = norm(json!({"li": {"key": 3, "class": "row"}})).unwrap();
        let Node::Element(li) = node else { panic!("expected element") };
        assert_eq!(li.key, Some(Key::Num(3)));
        assert!(!li.props.contains_key("key"));
        assert_eq!(li.props.get("class"), Some(&PropValue::from("row")));
    }

    #[test]
    fn failing_producer_is_isolated() {
        let desc = Description::list(vec![
            Description::from("before"),
            Description::fallible(|| Err::<Description, _>("offline")),
            Description::from("after"),
        ]);
        let Some(Node::Forest { children }) = normalize(&desc, 0) else {
            panic!("expected forest");
        };
        assert_eq!(children.len(), 3);
        assert_eq!(children[1], error_placeholder("offline"));
        assert_eq!(children[2], Node::text("after"));
    }

    #[test]
    fn producer_result_is_normalized() {
        let desc = Description::deferred(|| Description::tag("em", "lazy"));
        let expected = Element::new("em").with_child(Node::text("lazy"));
        assert_eq!(normalize(&desc, 0), Some(Node::Element(expected)));
    }

    #[test]
    fn runaway_depth_yields_sentinel() {
        fn nest(levels: usize) -> Description {
            if levels == 0 {
                return Description::from("leaf");
            }
            Description::tag("div", Attributes::new().children(nest(levels - 1)))
        }
        let node = Normalizer::new(5).normalize(&nest(50)).unwrap();
        let rendered = node.text_content();
        assert_eq!(rendered, DEPTH_EXCEEDED_TEXT);
    }

    #[test]
    fn child_arrays_cost_one_level_per_element() {
        fn nest(levels: usize) -> Description {
            if levels == 0 {
                return Description::from("leaf");
            }
            Description::tag("div", Attributes::new().children(Description::list(vec![nest(levels - 1)])))
        }
        assert_eq!(Normalizer::new(3).normalize(&nest(3)).unwrap().text_content(), "leaf");
        assert_eq!(Normalizer::new(3).normalize(&nest(4)).unwrap().text_content(), DEPTH_EXCEEDED_TEXT);
        assert_eq!(normalize(&nest(90), 0).unwrap().text_content(), "leaf");
    }

    #[test]
    fn self_referential_producer_terminates() {
        fn looping() -> Description {
            Description::deferred(looping)
        }
        assert_eq!(normalize(&looping(), 0), Some(depth_exceeded_placeholder()));
    }
}

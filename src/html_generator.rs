//! HTML string rendering of live document subtrees with consistent escaping
use crate::applier::Mount;
use crate::document::{Document, LiveId, LiveKind};
use crate::errors::ReconcilerError;
use crate::types::Node;
use phf::phf_set;

// Elements rendered without a closing tag
static VOID_ELEMENTS: phf::Set<&'static str> = phf_set! {
    "area", "base", "br", "col", "embed", "hr", "img", "input",
    "link", "meta", "source", "track", "wbr",
};

/// Consistent HTML text and attribute escaping
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

pub fn is_void_element(tag: &str) -> bool {
    VOID_ELEMENTS.contains(tag)
}

/// Markup of the node itself. A container renders as its children.
pub fn outer_html(doc: &Document, id: LiveId) -> String {
    let mut out = String::new();
    write_node(doc, id, &mut out);
    out
}

pub fn inner_html(doc: &Document, id: LiveId) -> String {
    let mut out = String::new();
    for &child in doc.child_ids(id) {
        write_node(doc, child, &mut out);
    }
    out
}

/// Render a canonical tree by materializing it into a scratch document.
pub fn render_to_string(node: &Node) -> Result<String, ReconcilerError> {
    let mut doc = Document::new();
    let root = doc.root();
    Mount::render(&mut doc, root, Some(node))?;
    Ok(doc.inner_html(root))
}

fn write_node(doc: &Document, id: LiveId, out: &mut String) {
    let Ok(node) = doc.node(id) else {
        return;
    };
    match &node.kind {
        LiveKind::Text(text) => out.push_str(&html_escape(text)),
        LiveKind::Container => {
            for &child in &node.children {
                write_node(doc, child, out);
            }
        }
        LiveKind::Element(tag) => {
            out.push('<');
            out.push_str(tag);
            if !node.class_list.is_empty() {
                out.push_str(&format!(r#" class="{}""#, html_escape(&node.class_list.join(" "))));
            }
            if !node.style.is_empty() {
                let decls: Vec<String> = node.style.iter().map(|(k, v)| format!("{k}: {v}")).collect();
                out.push_str(&format!(r#" style="{}""#, html_escape(&decls.join("; "))));
            }
            let mut attrs: Vec<(&String, &String)> = node.attributes.iter().collect();
            attrs.sort_by(|a, b| a.0.cmp(b.0));
            for (name, value) in attrs {
                if value.is_empty() {
                    out.push_str(&format!(" {}", html_escape(name)));
                } else {
                    out.push_str(&format!(r#" {}="{}""#, html_escape(name), html_escape(value)));
                }
            }
            out.push('>');
            if is_void_element(tag) {
                return;
            }
            for &child in &node.children {
                write_node(doc, child, out);
            }
            out.push_str(&format!("</{tag}>"));
        }
    }
}

//! Conversion of JSON tree descriptions into `Description`
use crate::description::{Attr, Attributes, Body, Description};
use crate::errors::ReconcilerError;
use crate::types::PropValue;
use serde_json::Value;

impl Description {
    /// Read a description from its JSON source shape.
    pub fn from_json(value: &Value) -> Result<Self, ReconcilerError> {
        json_to_description(value)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ReconcilerError> {
        let value: Value = serde_json::from_str(raw)?;
        json_to_description(&value)
    }
}

pub fn json_to_description(value: &Value) -> Result<Description, ReconcilerError> {
    match value {
        Value::Null => Ok(Description::Empty),
        Value::Bool(b) => Ok(Description::Bool(*b)),
        Value::Number(n) => Ok(Description::Number(n.as_f64().unwrap_or_default())),
        Value::String(s) => Ok(Description::Text(s.clone())),
        Value::Array(items) => items
            .iter()
            .map(json_to_description)
            .collect::<Result<Vec<_>, _>>()
            .map(Description::List),
        Value::Object(map) => {
            let mut entries = map.iter();
            match (entries.next(), entries.next()) {
                (Some((tag, body)), None) => Ok(Description::Tag {
                    name: tag.clone(),
                    body: json_to_body(body)?,
                }),
                _ => Err(ReconcilerError::TypeConversionError {
                    expected: "single-key element mapping".into(),
                    actual: format!("object with {} keys", map.len()),
                }),
            }
        }
    }
}

fn json_to_body(value: &Value) -> Result<Body, ReconcilerError> {
    match value {
        Value::Null => Ok(Body::Attributes(Attributes::new())),
        Value::Array(_) => Ok(Body::Attributes(
            Attributes::new().children(json_to_description(value)?),
        )),
        Value::Object(map) => {
            let mut attrs = Attributes::new();
            for (name, entry) in map {
                let attr = match (name.as_str(), entry) {
                    (_, Value::Null) => continue,
                    ("children", _) => Attr::Tree(json_to_description(entry)?),
                    ("style", Value::Object(decls)) => Attr::Value(PropValue::Str(style_string(decls))),
                    (_, other) => Attr::Value(json_to_prop(other)),
                };
                attrs.entries.insert(name.clone(), attr);
            }
            Ok(Body::Attributes(attrs))
        }
        primitive => Ok(Body::Value(json_to_prop(primitive))),
    }
}

/// Scalar JSON as a prop value; compound values keep their JSON text.
pub fn json_to_prop(value: &Value) -> PropValue {
    match value {
        Value::Bool(b) => PropValue::Bool(*b),
        Value::Number(n) => PropValue::Num(n.as_f64().unwrap_or_default()),
        Value::String(s) => PropValue::Str(s.clone()),
        other => PropValue::Str(other.to_string()),
    }
}

/// `{"font_size": "12px"}` becomes `font-size: 12px`.
fn style_string(decls: &serde_json::Map<String, Value>) -> String {
    decls
        .iter()
        .map(|(key, value)| {
            let css_value = match value.as_str() {
                Some(s) => s.to_string(),
                None => value.to_string(),
            };
            format!("{}: {}", key.replace('_', "-"), css_value)
        })
        .collect::<Vec<_>>()
        .join("; ")
}

//! XML media-type formatter.
//!
//! Writing follows the usual value-to-element conventions: object members
//! become child elements, array members repeat their element name, and a
//! root array wraps elements in `<item>`. Reading goes through quick-xml's
//! serde deserializer, which maps elements to object members (text content
//! lands under `$text`).

use bytes::Bytes;
use quick_xml::escape::escape;
use serde_json::Value;

use crate::{
    errors::{FaultCollection, ServiceError},
    ports::MediaTypeFormatter,
};

const ROOT: &str = "response";

/// Formatter for `application/xml` / `text/xml`.
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlFormatter;

impl XmlFormatter {
    pub fn new() -> Self {
        Self
    }
}

fn element(out: &mut String, name: &str, value: &Value) {
    match value {
        Value::Array(items) => {
            for item in items {
                element(out, name, item);
            }
        }
        Value::Object(map) => {
            out.push('<');
            out.push_str(name);
            out.push('>');
            for (key, member) in map {
                element(out, key, member);
            }
            out.push_str("</");
            out.push_str(name);
            out.push('>');
        }
        Value::Null => {
            out.push('<');
            out.push_str(name);
            out.push_str("/>");
        }
        Value::String(s) => {
            out.push('<');
            out.push_str(name);
            out.push('>');
            out.push_str(&escape(s));
            out.push_str("</");
            out.push_str(name);
            out.push('>');
        }
        other => {
            out.push('<');
            out.push_str(name);
            out.push('>');
            out.push_str(&other.to_string());
            out.push_str("</");
            out.push_str(name);
            out.push('>');
        }
    }
}

pub(crate) fn value_to_xml(value: &Value) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>");
    match value {
        Value::Object(map) => {
            out.push('<');
            out.push_str(ROOT);
            out.push('>');
            for (key, member) in map {
                element(&mut out, key, member);
            }
            out.push_str("</");
            out.push_str(ROOT);
            out.push('>');
        }
        Value::Array(items) => {
            out.push('<');
            out.push_str(ROOT);
            out.push('>');
            for item in items {
                element(&mut out, "item", item);
            }
            out.push_str("</");
            out.push_str(ROOT);
            out.push('>');
        }
        other => element(&mut out, ROOT, other),
    }
    out
}

impl MediaTypeFormatter for XmlFormatter {
    fn media_types(&self) -> &[&'static str] {
        &["application/xml", "text/xml"]
    }

    fn content_type(&self) -> &'static str {
        "application/xml; charset=utf-8"
    }

    fn read(&self, bytes: &[u8]) -> Result<Value, ServiceError> {
        let text = std::str::from_utf8(bytes).map_err(|e| {
            ServiceError::Validation(FaultCollection::general(format!(
                "request body is not UTF-8: {e}"
            )))
        })?;
        quick_xml::de::from_str(text).map_err(|e| {
            ServiceError::Validation(FaultCollection::general(format!(
                "request body is not valid XML: {e}"
            )))
        })
    }

    fn write(&self, value: &Value) -> Result<Bytes, ServiceError> {
        Ok(Bytes::from(value_to_xml(value)))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_object_members_become_elements() {
        let xml = value_to_xml(&json!({"id": 7, "name": "a<b"}));
        assert!(xml.contains("<response>"));
        assert!(xml.contains("<id>7</id>"));
        assert!(xml.contains("<name>a&lt;b</name>"));
    }

    #[test]
    fn test_array_members_repeat_their_element() {
        let xml = value_to_xml(&json!({"tag": ["x", "y"]}));
        assert!(xml.contains("<tag>x</tag><tag>y</tag>"));
    }

    #[test]
    fn test_root_array_uses_item_elements() {
        let xml = value_to_xml(&json!([1, 2]));
        assert!(xml.contains("<item>1</item><item>2</item>"));
    }

    #[test]
    fn test_null_renders_empty_element() {
        let xml = value_to_xml(&json!({"parent": null}));
        assert!(xml.contains("<parent/>"));
    }

    #[test]
    fn test_read_simple_document() {
        let formatter = XmlFormatter::new();
        let value = formatter
            .read(b"<user><id>5</id><name>ann</name></user>")
            .unwrap();
        assert_eq!(value["id"], "5");
        assert_eq!(value["name"], "ann");
    }

    #[test]
    fn test_read_invalid_is_a_binding_fault() {
        let err = XmlFormatter::new().read(b"<user><id>").unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }
}

//! JSON media-type formatter.

use bytes::Bytes;
use serde_json::Value;

use crate::{
    config::JsonOptions,
    errors::{FaultCollection, ServiceError},
    ports::MediaTypeFormatter,
};

/// Formatter for `application/json`, honoring the configured null-handling
/// and pretty-printing options.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFormatter {
    options: JsonOptions,
}

impl JsonFormatter {
    pub fn new(options: JsonOptions) -> Self {
        Self { options }
    }
}

/// Recursively drop null-valued object members.
pub(crate) fn strip_nulls(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), strip_nulls(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(strip_nulls).collect()),
        other => other.clone(),
    }
}

impl MediaTypeFormatter for JsonFormatter {
    fn media_types(&self) -> &[&'static str] {
        &["application/json", "text/json"]
    }

    fn content_type(&self) -> &'static str {
        "application/json; charset=utf-8"
    }

    fn read(&self, bytes: &[u8]) -> Result<Value, ServiceError> {
        serde_json::from_slice(bytes).map_err(|e| {
            ServiceError::Validation(FaultCollection::general(format!(
                "request body is not valid JSON: {e}"
            )))
        })
    }

    fn write(&self, value: &Value) -> Result<Bytes, ServiceError> {
        let value = if self.options.omit_nulls {
            strip_nulls(value)
        } else {
            value.clone()
        };
        let bytes = if self.options.pretty {
            serde_json::to_vec_pretty(&value)
        } else {
            serde_json::to_vec(&value)
        }
        .map_err(|e| ServiceError::internal(format!("JSON serialization: {e}")))?;
        Ok(Bytes::from(bytes))
    }
}

//! BSON media-type formatter.
//!
//! BSON documents are maps at the top level, so non-object values are
//! wrapped under a `value` member before encoding.

use bytes::Bytes;
use serde_json::{Value, json};

use crate::{
    errors::{FaultCollection, ServiceError},
    ports::MediaTypeFormatter,
};

/// Formatter for `application/bson`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BsonFormatter;

impl BsonFormatter {
    pub fn new() -> Self {
        Self
    }
}

impl MediaTypeFormatter for BsonFormatter {
    fn media_types(&self) -> &[&'static str] {
        &["application/bson"]
    }

    fn read(&self, bytes: &[u8]) -> Result<Value, ServiceError> {
        bson::from_slice(bytes).map_err(|e| {
            ServiceError::Validation(FaultCollection::general(format!(
                "request body is not valid BSON: {e}"
            )))
        })
    }

    fn write(&self, value: &Value) -> Result<Bytes, ServiceError> {
        let document = if value.is_object() {
            value.clone()
        } else {
            json!({ "value": value })
        };
        let bytes = bson::to_vec(&document)
            .map_err(|e| ServiceError::internal(format!("BSON serialization: {e}")))?;
        Ok(Bytes::from(bytes))
    }
}

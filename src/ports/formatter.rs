//! Media-type formatter port.
//!
//! A formatter converts between wire payload bytes and in-memory values for
//! the media types it declares. The same registry serves both directions:
//! request bodies are read through the formatter matching `Content-Type`,
//! and negotiated responses are written through the formatter matching the
//! `Accept` header.

use bytes::Bytes;
use serde_json::Value;

use crate::errors::ServiceError;

/// Converts between wire bytes and values for a set of media types.
pub trait MediaTypeFormatter: Send + Sync {
    /// Media types this formatter serves, most canonical first.
    fn media_types(&self) -> &[&'static str];

    /// The `Content-Type` written on responses produced by this formatter.
    fn content_type(&self) -> &'static str {
        self.media_types().first().copied().unwrap_or("application/octet-stream")
    }

    /// Whether this formatter can produce response bodies. Read-only
    /// formatters (e.g. form-urlencoded) are skipped during negotiation.
    fn can_write(&self) -> bool {
        true
    }

    /// Deserialize a request body. Failures are resource-binding faults.
    fn read(&self, bytes: &[u8]) -> Result<Value, ServiceError>;

    /// Serialize a response value.
    fn write(&self, value: &Value) -> Result<Bytes, ServiceError>;
}

impl std::fmt::Debug for dyn MediaTypeFormatter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaTypeFormatter")
            .field("content_type", &self.content_type())
            .finish()
    }
}

//! Form-urlencoded reader.
//!
//! Read-only: POSTed HTML forms bind to a resource value, but responses are
//! never written in this format, so the formatter opts out of negotiation.

use bytes::Bytes;
use serde_json::{Map, Value};

use crate::{
    errors::{FaultCollection, ServiceError},
    ports::MediaTypeFormatter,
};

/// Reader for `application/x-www-form-urlencoded` request bodies. Repeated
/// keys collect into an array.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormUrlEncodedFormatter;

impl FormUrlEncodedFormatter {
    pub fn new() -> Self {
        Self
    }
}

fn decode(raw: &str) -> Result<String, ServiceError> {
    // '+' means space in form encoding, percent-decoding handles the rest.
    let plus_decoded = raw.replace('+', " ");
    urlencoding::decode(&plus_decoded)
        .map(|cow| cow.into_owned())
        .map_err(|e| {
            ServiceError::Validation(FaultCollection::general(format!(
                "request body is not valid form data: {e}"
            )))
        })
}

impl MediaTypeFormatter for FormUrlEncodedFormatter {
    fn media_types(&self) -> &[&'static str] {
        &["application/x-www-form-urlencoded"]
    }

    fn can_write(&self) -> bool {
        false
    }

    fn read(&self, bytes: &[u8]) -> Result<Value, ServiceError> {
        let text = std::str::from_utf8(bytes).map_err(|e| {
            ServiceError::Validation(FaultCollection::general(format!(
                "request body is not UTF-8: {e}"
            )))
        })?;

        let mut map = Map::new();
        for pair in text.split('&').filter(|p| !p.is_empty()) {
            let mut kv = pair.splitn(2, '=');
            let key = decode(kv.next().unwrap_or_default())?;
            let value = Value::String(decode(kv.next().unwrap_or_default())?);

            match map.get_mut(&key) {
                Some(Value::Array(items)) => items.push(value),
                Some(existing) => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, value]);
                }
                None => {
                    map.insert(key, value);
                }
            }
        }
        Ok(Value::Object(map))
    }

    fn write(&self, _value: &Value) -> Result<Bytes, ServiceError> {
        Err(ServiceError::NotAcceptable)
    }
}

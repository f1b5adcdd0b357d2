//! Error taxonomy for the request pipeline.
//!
//! Two families of failure exist: direct-response errors, which already carry
//! the HTTP status and message the client must see and are never reinterpreted
//! by behavior exception handling, and everything else, which flows through
//! the behaviors' exception hooks before being mapped to a status code.
//! Authorization denials are not errors at all; they are `Stop` values on the
//! behavior chain, keeping the hot path exception-free.

use std::{collections::BTreeMap, time::Duration};

use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while locating, invoking, or rendering a service method.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ServiceError {
    /// Direct-response error: propagates to the client verbatim, bypassing
    /// the behaviors' `on_exception` hooks.
    #[error("{status}: {message}")]
    Http { status: StatusCode, message: String },

    /// Resource binding failed; the collected faults are serialized through
    /// the negotiated formatter with a 400 status.
    #[error("resource validation failed")]
    Validation(FaultCollection),

    /// No registered formatter can produce any media type the client accepts.
    #[error("no acceptable response representation")]
    NotAcceptable,

    /// The request body's media type has no registered formatter.
    #[error("unsupported media type '{0}'")]
    UnsupportedMediaType(String),

    /// The service method did not complete within its configured timeout.
    #[error("service method timed out after {0:?}")]
    Timeout(Duration),

    /// Unhandled execution failure. Logged server-side, opaque to the client.
    #[error("internal service error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Direct-response error with an explicit status code and message.
    pub fn http(status: StatusCode, message: impl Into<String>) -> Self {
        ServiceError::Http {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::http(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::http(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ServiceError::Internal(message.into())
    }

    /// The HTTP status this error maps to at the pipeline boundary.
    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::Http { status, .. } => *status,
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotAcceptable => StatusCode::NOT_ACCEPTABLE,
            ServiceError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ServiceError::Timeout(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether this error fully specifies the response and must skip the
    /// behaviors' exception hooks.
    pub fn is_direct_response(&self) -> bool {
        matches!(self, ServiceError::Http { .. })
    }
}

/// Aggregated resource-binding faults: general faults plus faults keyed by
/// the offending property.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FaultCollection {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub general: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub by_property: BTreeMap<String, Vec<String>>,
}

impl FaultCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single general fault, the common case for an unparsable body.
    pub fn general(message: impl Into<String>) -> Self {
        Self {
            general: vec![message.into()],
            by_property: BTreeMap::new(),
        }
    }

    pub fn add_general(&mut self, message: impl Into<String>) {
        self.general.push(message.into());
    }

    pub fn add_property(&mut self, property: impl Into<String>, message: impl Into<String>) {
        self.by_property
            .entry(property.into())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.general.is_empty() && self.by_property.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_response_status_preserved() {
        let err = ServiceError::http(StatusCode::CONFLICT, "already exists");
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert!(err.is_direct_response());
    }

    #[test]
    fn test_taxonomy_statuses() {
        assert_eq!(
            ServiceError::Validation(FaultCollection::general("bad")).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ServiceError::NotAcceptable.status(), StatusCode::NOT_ACCEPTABLE);
        assert_eq!(
            ServiceError::UnsupportedMediaType("text/csv".into()).status(),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
        assert_eq!(
            ServiceError::Timeout(Duration::from_secs(1)).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert!(!ServiceError::Timeout(Duration::from_secs(1)).is_direct_response());
    }

    #[test]
    fn test_fault_collection_round_trip() {
        let mut faults = FaultCollection::new();
        faults.add_general("body is not valid JSON");
        faults.add_property("name", "must not be empty");
        faults.add_property("name", "must be shorter than 64 characters");

        let json = serde_json::to_string(&faults).expect("serializable");
        let back: FaultCollection = serde_json::from_str(&json).expect("deserializable");
        assert_eq!(back, faults);
        assert_eq!(back.by_property.get("name").map(Vec::len), Some(2));
    }
}

//! HMAC signature authentication.
//!
//! The behavior itself only knows how to compute and compare keyed hashes; a
//! [`SignatureScheme`] supplies the two request-specific pieces: where the
//! client signature lives and which bytes were signed. Services with custom
//! canonicalization implement the trait; the header-based default covers the
//! common case.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use http::StatusCode;
use md5::Md5;
use sha1::Sha1;
use sha2::{Sha256, Sha384, Sha512};

use crate::{
    core::context::{MethodContext, ServiceRequest},
    ports::{BehaviorResult, SecureServiceBehavior, ServiceBehavior},
};

/// Hash function underlying the keyed signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

// HMAC accepts keys of any length, so the error arms below are unreachable;
// they keep the hot path free of panicking branches.
macro_rules! sign_with {
    ($digest:ty, $key:expr, $payload:expr) => {{
        match <Hmac<$digest> as Mac>::new_from_slice($key) {
            Ok(mut mac) => {
                mac.update($payload);
                mac.finalize().into_bytes().to_vec()
            }
            Err(_) => Vec::new(),
        }
    }};
}

macro_rules! verify_with {
    ($digest:ty, $key:expr, $payload:expr, $signature:expr) => {{
        match <Hmac<$digest> as Mac>::new_from_slice($key) {
            Ok(mut mac) => {
                mac.update($payload);
                mac.verify_slice($signature).is_ok()
            }
            Err(_) => false,
        }
    }};
}

impl HashAlgorithm {
    /// Compute `HMAC(key, payload)`.
    pub fn sign(&self, key: &[u8], payload: &[u8]) -> Vec<u8> {
        match self {
            HashAlgorithm::Md5 => sign_with!(Md5, key, payload),
            HashAlgorithm::Sha1 => sign_with!(Sha1, key, payload),
            HashAlgorithm::Sha256 => sign_with!(Sha256, key, payload),
            HashAlgorithm::Sha384 => sign_with!(Sha384, key, payload),
            HashAlgorithm::Sha512 => sign_with!(Sha512, key, payload),
        }
    }

    /// Constant-time comparison of `signature` against `HMAC(key, payload)`.
    pub fn verify(&self, key: &[u8], payload: &[u8], signature: &[u8]) -> bool {
        match self {
            HashAlgorithm::Md5 => verify_with!(Md5, key, payload, signature),
            HashAlgorithm::Sha1 => verify_with!(Sha1, key, payload, signature),
            HashAlgorithm::Sha256 => verify_with!(Sha256, key, payload, signature),
            HashAlgorithm::Sha384 => verify_with!(Sha384, key, payload, signature),
            HashAlgorithm::Sha512 => verify_with!(Sha512, key, payload, signature),
        }
    }
}

/// Supplies the request-specific halves of signature validation.
pub trait SignatureScheme: Send + Sync {
    /// Extract the client's signature bytes from the request, if present.
    fn client_signature(&self, request: &ServiceRequest) -> Option<Vec<u8>>;

    /// The exact bytes the client was expected to sign.
    fn signed_payload(&self, request: &ServiceRequest) -> Vec<u8>;
}

/// Default scheme: hex signature in a header, payload =
/// `METHOD\npath?query\n` followed by the raw body.
pub struct HeaderSignatureScheme {
    header: String,
}

impl HeaderSignatureScheme {
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
        }
    }
}

impl Default for HeaderSignatureScheme {
    fn default() -> Self {
        Self::new("x-signature")
    }
}

impl SignatureScheme for HeaderSignatureScheme {
    fn client_signature(&self, request: &ServiceRequest) -> Option<Vec<u8>> {
        request
            .header(&self.header)
            .and_then(|value| hex::decode(value.trim()).ok())
    }

    fn signed_payload(&self, request: &ServiceRequest) -> Vec<u8> {
        let mut payload = Vec::with_capacity(64 + request.body().len());
        payload.extend_from_slice(request.method().as_str().as_bytes());
        payload.push(b'\n');
        let path_and_query = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or_else(|| request.path());
        payload.extend_from_slice(path_and_query.as_bytes());
        payload.push(b'\n');
        payload.extend_from_slice(request.body());
        payload
    }
}

/// Validates a keyed request signature computed from a shared private key.
pub struct HmacBehavior {
    scheme: Box<dyn SignatureScheme>,
    algorithm: HashAlgorithm,
    key: Vec<u8>,
}

impl HmacBehavior {
    pub fn new(
        scheme: impl SignatureScheme + 'static,
        algorithm: HashAlgorithm,
        key: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            scheme: Box::new(scheme),
            algorithm,
            key: key.into(),
        }
    }
}

#[async_trait]
impl ServiceBehavior for HmacBehavior {
    fn as_secure(&self) -> Option<&dyn SecureServiceBehavior> {
        Some(self)
    }
}

#[async_trait]
impl SecureServiceBehavior for HmacBehavior {
    async fn on_authorizing(&self, ctx: &mut MethodContext) -> BehaviorResult {
        let Some(signature) = self.scheme.client_signature(ctx.request()) else {
            return BehaviorResult::stop(StatusCode::UNAUTHORIZED, "Unauthorized");
        };

        let payload = self.scheme.signed_payload(ctx.request());
        if self.algorithm.verify(&self.key, &payload, &signature) {
            BehaviorResult::Execute
        } else {
            tracing::debug!("HMAC signature mismatch");
            BehaviorResult::stop(StatusCode::UNAUTHORIZED, "Unauthorized")
        }
    }

    fn is_authentication(&self) -> bool {
        true
    }
}

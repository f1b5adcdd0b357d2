//! Secure behaviors: authentication and request gating.

pub mod acl;
pub mod basic;
pub mod digest;
pub mod gates;
pub mod hmac;
pub mod throttle;

pub use acl::{AclBehavior, IpNetwork};
pub use basic::BasicAuthBehavior;
pub use digest::DigestAuthBehavior;
pub use gates::{AjaxOnlyBehavior, HttpsOnlyBehavior};
pub use hmac::{HashAlgorithm, HeaderSignatureScheme, HmacBehavior, SignatureScheme};
pub use throttle::ThrottleBehavior;

//! Ports: the traits applications implement or depend on.

pub mod behavior;
pub mod credentials;
pub mod formatter;
pub mod service;

pub use behavior::{BehaviorResult, ExceptionOutcome, SecureServiceBehavior, ServiceBehavior};
pub use credentials::{CredentialSource, MemoryCredentialSource, StoredCredentials};
pub use formatter::MediaTypeFormatter;
pub use service::{MethodHandler, MethodReturn, handler};

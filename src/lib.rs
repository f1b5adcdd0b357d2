//! Synapse - a behavior-driven REST service framework.
//!
//! Synapse dispatches HTTP requests to explicitly registered service methods
//! and wraps every call in an ordered **behavior pipeline**. This library
//! exposes the building blocks so you can embed the dispatcher or compose
//! parts of it inside your own application.
//!
//! # Features
//! - Route table built once at startup: (method, path template) → handler
//!   closure, with priorities for overlapping templates
//! - Behavior pipeline with short-circuit semantics: authorize → execute →
//!   invoke → unwind, plus exception hooks
//! - Authentication behaviors: Basic, Digest (RFC 2617 with stale-nonce
//!   handling), HMAC signatures, IP allow-lists, throttling, HTTPS/AJAX gates
//! - Content negotiation over pluggable media-type formatters (JSON, XML,
//!   BSON, form-urlencoded), with route-level overrides
//! - Typed results: raw content, JSON/JSONP/XML/BSON, Atom/RSS feeds, files,
//!   streams, redirects, bare statuses
//! - Cooperative per-method timeouts with cancellation tokens
//! - Output caching that revalidates authorization on every hit
//! - Structured tracing via `tracing`; graceful shutdown
//!
//! # Quick Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use synapse::{
//!     HttpServerAdapter, MethodReturn, RestService, Route, config::FrameworkConfig,
//! };
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let service = RestService::builder(FrameworkConfig::default())
//!     .route(Route::get("/users/{id}").handle(|args, _cancel| async move {
//!         let id = args.path_param("id").unwrap_or_default().to_string();
//!         MethodReturn::value(serde_json::json!({ "id": id }))
//!     }))
//!     .build()?;
//!
//! HttpServerAdapter::new(Arc::new(service)).serve().await?;
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! The crate separates **ports** (traits) from **adapters** (implementations)
//! while keeping the dispatch logic inside `core`. End users should prefer
//! the re‑exports documented below instead of reaching into internal modules
//! directly.
//!
//! # Error Handling
//! Setup APIs return `eyre::Result<T>`; request-path failures are a domain
//! error type (`ServiceError`) that the pipeline maps onto responses.
//! Authorization denials never raise errors at all.
//!
//! # Concurrency & Data Structures
//! Registries are frozen before traffic and shared without locking. The only
//! concurrent structures on the hot path are the output cache (`scc`) and
//! the throttle state (`governor`), both designed for contention.

// Re-export public modules with explicit visibility controls
pub mod config;
pub mod errors;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

// These modules are implementation details and should not be directly used by users
pub mod adapters;
pub mod core;

// Re-export the types most applications need
pub use crate::{
    adapters::HttpServerAdapter,
    core::{
        CachePolicy, Feed, FeedEntry, FeedFormat, MethodArgs, MethodContext, RestService,
        RestServiceBuilder, Route, ServiceRequest, ServiceResponse, ServiceResult,
        auth::{
            AclBehavior, AjaxOnlyBehavior, BasicAuthBehavior, DigestAuthBehavior, HashAlgorithm,
            HeaderSignatureScheme, HmacBehavior, HttpsOnlyBehavior, SignatureScheme,
            ThrottleBehavior,
        },
    },
    errors::{FaultCollection, ServiceError},
    ports::{
        BehaviorResult, CredentialSource, ExceptionOutcome, MediaTypeFormatter,
        MemoryCredentialSource, MethodReturn, SecureServiceBehavior, ServiceBehavior,
        StoredCredentials, handler,
    },
};

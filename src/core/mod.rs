//! Core framework logic: routing, the behavior pipeline, negotiation,
//! results, and the built-in secure behaviors.

pub mod auth;
pub(crate) mod cache;
pub mod context;
pub mod feed;
pub(crate) mod invoker;
pub mod negotiation;
mod pipeline;
pub mod registry;
pub mod results;
pub mod router;
pub mod service;

pub use context::{MethodArgs, MethodContext, ResponseState, ServiceRequest};
pub use feed::{Feed, FeedEntry, FeedFormat};
pub use registry::FormatterRegistry;
pub use results::{ResponseBody, ServiceResponse, ServiceResult};
pub use router::{CachePolicy, RouteDescriptor};
pub use service::{BuildError, RestService, RestServiceBuilder, Route};

//! Service method port: the application-defined handler bound to a route.
//!
//! Handlers are explicit registration closures, not reflected methods: they
//! receive an owned snapshot of the request context plus a cancellation
//! token, and return either a negotiable value or an already-typed result.

use std::{future::Future, pin::Pin, sync::Arc};

use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::{core::context::MethodArgs, core::results::ServiceResult, errors::ServiceError};

/// What a service method hands back to the pipeline.
#[derive(Debug)]
pub enum MethodReturn {
    /// An already-typed result, used verbatim (explicit control over the
    /// response).
    Result(ServiceResult),
    /// A plain value; the result factory negotiates a formatter for it from
    /// the request's `Accept` header.
    Value(Value),
    /// Nothing to return; renders as 204 No Content.
    None,
}

impl MethodReturn {
    /// Wrap any serializable value for content negotiation.
    pub fn value<T: Serialize>(value: T) -> Result<Self, ServiceError> {
        let value = serde_json::to_value(value)
            .map_err(|e| ServiceError::internal(format!("return value not serializable: {e}")))?;
        Ok(MethodReturn::Value(value))
    }

    pub fn result(result: ServiceResult) -> Self {
        MethodReturn::Result(result)
    }
}

pub type MethodFuture =
    Pin<Box<dyn Future<Output = Result<MethodReturn, ServiceError>> + Send + 'static>>;

/// Boxed handler closure stored in a route binding.
pub type MethodHandler =
    Arc<dyn Fn(MethodArgs, CancellationToken) -> MethodFuture + Send + Sync + 'static>;

/// Adapt an async closure into a [`MethodHandler`].
///
/// Handlers that never block on external work may ignore the cancellation
/// token; long-running ones should observe it, since a fired timeout only
/// signals; it does not abort.
pub fn handler<F, Fut>(f: F) -> MethodHandler
where
    F: Fn(MethodArgs, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<MethodReturn, ServiceError>> + Send + 'static,
{
    Arc::new(move |args, cancel| Box::pin(f(args, cancel)))
}

//! Behavior ports: the hook points wrapped around every service method call.
//!
//! A behavior is a middleware-like unit scoped to one method invocation. The
//! chain runs `on_authorizing` (secure behaviors only) and `on_executing` in
//! registration order, the service method, then `on_executed` in reverse
//! order; `on_exception` is offered the failure when the method errs.
//! Short-circuiting is modeled with `BehaviorResult::Stop`, never with
//! errors, so denials stay off the exception path.
//!
//! Behavior instances are shared across requests (`Arc`) and must hold no
//! per-request mutable state.

use async_trait::async_trait;
use http::StatusCode;

use crate::{
    core::{context::MethodContext, results::ServiceResult, router::RouteDescriptor},
    errors::ServiceError,
    ports::service::MethodReturn,
};

/// Outcome of an authorizing or executing hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BehaviorResult {
    /// Continue down the chain.
    Execute,
    /// Short-circuit: no later hook and no service method runs. The status
    /// and description become the response unless the behavior already set
    /// the response status to 401 (multi-step challenges keep their status).
    Stop {
        status: StatusCode,
        description: String,
    },
}

impl BehaviorResult {
    pub fn stop(status: StatusCode, description: impl Into<String>) -> Self {
        BehaviorResult::Stop {
            status,
            description: description.into(),
        }
    }

    /// Conventional denial for secure behaviors that do not challenge.
    pub fn forbidden(description: impl Into<String>) -> Self {
        Self::stop(StatusCode::FORBIDDEN, description)
    }
}

/// Outcome of offering an exception to a behavior.
pub enum ExceptionOutcome {
    /// The behavior converted the failure into a response; later behaviors
    /// are not consulted.
    Handle(ServiceResult),
    /// Let the next behavior see the failure (or the default error mapping
    /// if none handles it).
    BubbleUp,
}

/// A unit hooking into the executing/executed/exception points of a single
/// service method call.
#[async_trait]
pub trait ServiceBehavior: Send + Sync {
    /// Whether this behavior participates for the given route. Global
    /// behaviors use this to opt out of routes they do not apply to.
    fn applies_to(&self, _route: &RouteDescriptor) -> bool {
        true
    }

    /// Secure behaviors expose themselves here so the pipeline can run their
    /// authorizing hook without downcasting.
    fn as_secure(&self) -> Option<&dyn SecureServiceBehavior> {
        None
    }

    /// Runs after authorization, before the service method. `Stop` aborts
    /// the call.
    async fn on_executing(&self, _ctx: &mut MethodContext) -> BehaviorResult {
        BehaviorResult::Execute
    }

    /// Runs after a successful invocation, in reverse chain order.
    async fn on_executed(&self, _ctx: &mut MethodContext, _returned: &MethodReturn) {}

    /// Offered any non-direct-response failure from the service method.
    async fn on_exception(
        &self,
        _ctx: &mut MethodContext,
        _error: &ServiceError,
    ) -> ExceptionOutcome {
        ExceptionOutcome::BubbleUp
    }
}

/// A behavior specialized for authentication/authorization decisions.
///
/// Every secure behavior that returns `Execute` for a request is recorded as
/// an output-cache validator for the response it produced: a later cache hit
/// re-runs `on_authorizing` and evicts the entry if the decision changed.
#[async_trait]
pub trait SecureServiceBehavior: ServiceBehavior {
    /// Authorize the pending method call. Runs before any `on_executing`
    /// hook; the first `Stop` wins.
    async fn on_authorizing(&self, ctx: &mut MethodContext) -> BehaviorResult;

    /// Authentication behaviors (credential-validating ones) run before
    /// other secure behaviors, and at most one may be attached to a method.
    fn is_authentication(&self) -> bool {
        false
    }
}

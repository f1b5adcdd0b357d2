//! Trivial boolean gates on request metadata.

use async_trait::async_trait;
use http::StatusCode;

use crate::{
    core::context::MethodContext,
    ports::{BehaviorResult, SecureServiceBehavior, ServiceBehavior},
};

/// Rejects requests that did not arrive over TLS (directly or via a proxy
/// that sets `X-Forwarded-Proto`).
#[derive(Debug, Default)]
pub struct HttpsOnlyBehavior;

impl HttpsOnlyBehavior {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ServiceBehavior for HttpsOnlyBehavior {
    fn as_secure(&self) -> Option<&dyn SecureServiceBehavior> {
        Some(self)
    }
}

#[async_trait]
impl SecureServiceBehavior for HttpsOnlyBehavior {
    async fn on_authorizing(&self, ctx: &mut MethodContext) -> BehaviorResult {
        if ctx.request().is_secure() {
            BehaviorResult::Execute
        } else {
            BehaviorResult::stop(StatusCode::FORBIDDEN, "HTTPS is required")
        }
    }
}

/// Rejects requests not marked as XMLHttpRequest by `X-Requested-With`.
#[derive(Debug, Default)]
pub struct AjaxOnlyBehavior;

impl AjaxOnlyBehavior {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ServiceBehavior for AjaxOnlyBehavior {
    fn as_secure(&self) -> Option<&dyn SecureServiceBehavior> {
        Some(self)
    }
}

#[async_trait]
impl SecureServiceBehavior for AjaxOnlyBehavior {
    async fn on_authorizing(&self, ctx: &mut MethodContext) -> BehaviorResult {
        if ctx.request().is_ajax() {
            BehaviorResult::Execute
        } else {
            BehaviorResult::stop(StatusCode::FORBIDDEN, "AJAX requests only")
        }
    }
}

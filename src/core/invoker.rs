//! Service method invocation with cooperative timeout enforcement.
//!
//! Asynchronous methods are raced against a timer: if the timer wins, the
//! method's cancellation token is triggered and the request fails with a
//! timeout error. Cancellation is a signal, not an abort: the callee must
//! observe the token. Whatever the abandoned future would eventually report
//! is irrelevant; a fired timeout is terminal for the request.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::{
    core::{context::MethodContext, router::RouteBinding},
    errors::ServiceError,
    ports::MethodReturn,
};

/// Effective timeout for a binding: the route override wins over the global
/// default, and a zero duration disables the race entirely.
pub(crate) fn effective_timeout(
    binding: &RouteBinding,
    global_default: Option<Duration>,
) -> Option<Duration> {
    binding
        .timeout
        .or(global_default)
        .filter(|t| !t.is_zero())
}

/// Invoke the bound service method, racing it against `timeout` when one is
/// configured.
pub(crate) async fn invoke(
    binding: &RouteBinding,
    ctx: &MethodContext,
    timeout: Option<Duration>,
) -> Result<MethodReturn, ServiceError> {
    let args = ctx.to_args();
    let cancellation = CancellationToken::new();
    let mut future = (binding.handler)(args, cancellation.child_token());

    match timeout {
        Some(limit) => {
            tokio::select! {
                outcome = &mut future => finish(binding, outcome),
                _ = tokio::time::sleep(limit) => {
                    cancellation.cancel();
                    tracing::warn!(
                        route = %binding.descriptor().template(),
                        timeout_ms = limit.as_millis() as u64,
                        "Service method timed out; cancellation signalled"
                    );
                    // The method keeps running until it observes the token;
                    // its eventual outcome no longer affects this request.
                    let template = binding.descriptor().template().to_string();
                    tokio::spawn(async move {
                        if let Err(error) = future.await {
                            if !error.is_direct_response() {
                                tracing::debug!(
                                    route = %template,
                                    error = %error,
                                    "Timed-out method eventually failed"
                                );
                            }
                        }
                    });
                    Err(ServiceError::Timeout(limit))
                }
            }
        }
        None => finish(binding, future.await),
    }
}

/// Unwrap the method outcome: direct-response errors propagate verbatim to
/// preserve their status and body, anything else is logged here once.
fn finish(
    binding: &RouteBinding,
    outcome: Result<MethodReturn, ServiceError>,
) -> Result<MethodReturn, ServiceError> {
    if let Err(error) = &outcome {
        if !error.is_direct_response() {
            tracing::error!(
                route = %binding.descriptor().template(),
                error = %error,
                "Service method failed"
            );
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicBool, Ordering},
        },
        time::Instant,
    };

    use http::Method;

    use super::*;
    use crate::{
        core::{context::ServiceRequest, router::RouteDescriptor},
        ports::handler,
    };

    fn binding_with(handler: crate::ports::MethodHandler, timeout: Option<Duration>) -> RouteBinding {
        RouteBinding {
            descriptor: Arc::new(RouteDescriptor::new(Method::GET, "/slow")),
            handler,
            chain: Vec::new(),
            timeout,
            cache: None,
            formatters: crate::core::registry::FormatterRegistry::new(),
            default_media_type: None,
            priority: 0,
        }
    }

    fn ctx() -> MethodContext {
        let request =
            Arc::new(ServiceRequest::builder(Method::GET, "/slow".parse().unwrap()).build());
        MethodContext::new(request, Arc::new(RouteDescriptor::new(Method::GET, "/slow")))
    }

    #[tokio::test]
    async fn test_timeout_fires_and_token_is_observed() {
        let observed = Arc::new(AtomicBool::new(false));
        let observed_clone = Arc::clone(&observed);

        let binding = binding_with(
            handler(move |_, cancel| {
                let observed = Arc::clone(&observed_clone);
                async move {
                    cancel.cancelled().await;
                    observed.store(true, Ordering::SeqCst);
                    Ok(MethodReturn::None)
                }
            }),
            Some(Duration::from_millis(50)),
        );

        let started = Instant::now();
        let err = invoke(&binding, &ctx(), binding.timeout).await.unwrap_err();
        assert!(matches!(err, ServiceError::Timeout(_)));
        assert!(started.elapsed() >= Duration::from_millis(50));

        // The abandoned future is still scheduled; give it a beat to observe
        // the cancellation signal.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(observed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_fast_method_beats_the_timer() {
        let binding = binding_with(
            handler(|_, _| async { Ok(MethodReturn::None) }),
            Some(Duration::from_secs(5)),
        );
        assert!(invoke(&binding, &ctx(), binding.timeout).await.is_ok());
    }

    #[tokio::test]
    async fn test_zero_timeout_means_none() {
        let binding = binding_with(
            handler(|_, _| async { Ok(MethodReturn::None) }),
            Some(Duration::ZERO),
        );
        assert_eq!(effective_timeout(&binding, None), None);
        assert_eq!(
            effective_timeout(&binding, Some(Duration::from_secs(1))),
            None
        );
    }

    #[tokio::test]
    async fn test_route_override_beats_global() {
        let binding = binding_with(
            handler(|_, _| async { Ok(MethodReturn::None) }),
            Some(Duration::from_millis(200)),
        );
        assert_eq!(
            effective_timeout(&binding, Some(Duration::from_secs(9))),
            Some(Duration::from_millis(200))
        );
    }
}

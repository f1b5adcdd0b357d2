//! The dispatch pipeline: route match → behavior chain → method invocation →
//! result execution.
//!
//! Ordering contract: secure behaviors authorize first (authentication ahead
//! of the rest), `on_executing` runs in chain order, the method is invoked
//! only if nothing stopped, `on_executed` unwinds in reverse order, and
//! `on_exception` sees non-direct-response failures in chain order until one
//! handles it. Denials are `Stop` values and never raise errors.

use std::sync::Arc;

use http::{StatusCode, header};
use tracing::Instrument;

use crate::{
    core::{
        cache::{CacheEntry, OutputCache},
        context::{MethodContext, ServiceRequest},
        invoker,
        negotiation::{negotiate_reader, negotiate_writer},
        registry,
        results::{ResponseBody, ServiceResponse, ServiceResult, execute_result},
        router::{RouteBinding, RouteResolution},
        service::RestService,
    },
    errors::ServiceError,
    ports::{BehaviorResult, ExceptionOutcome, MethodReturn},
};

impl RestService {
    /// Run one request through the full pipeline. Never fails: every error
    /// path maps to a response.
    pub async fn dispatch(&self, request: ServiceRequest) -> ServiceResponse {
        let span = tracing::info_span!(
            "dispatch",
            http.method = %request.method(),
            http.path = %request.path(),
        );
        self.dispatch_inner(request).instrument(span).await
    }

    async fn dispatch_inner(&self, request: ServiceRequest) -> ServiceResponse {
        let (binding, params) = match self.routes.resolve(request.method(), request.path()) {
            RouteResolution::Found { binding, params } => (binding, params),
            RouteResolution::MethodNotAllowed(allowed) => {
                let mut headers = http::HeaderMap::new();
                let allow = allowed
                    .iter()
                    .map(|m| m.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                if let Ok(value) = http::HeaderValue::from_str(&allow) {
                    headers.insert(header::ALLOW, value);
                }
                return ServiceResponse::plain(
                    StatusCode::METHOD_NOT_ALLOWED,
                    "Method Not Allowed",
                    headers,
                );
            }
            RouteResolution::NotFound => {
                return ServiceResponse::plain(
                    StatusCode::NOT_FOUND,
                    "Not Found",
                    http::HeaderMap::new(),
                );
            }
        };

        let mut request = request;
        request.set_path_params(params);
        let request = Arc::new(request);

        let cache_key = binding.cache.map(|_| {
            OutputCache::key(
                request.method(),
                request.path(),
                request.query(),
                self.config().cache.vary_query,
            )
        });

        // A cache hit is only served after every secure behavior that
        // authorized the original response authorizes this request too.
        if let Some(key) = &cache_key {
            if let Some(entry) = self.cache.lookup(key).await {
                if self.revalidate(&entry, &request, &binding).await {
                    tracing::debug!(key = %key, "Serving revalidated cache entry");
                    return ServiceResponse {
                        status: entry.status,
                        headers: entry.headers,
                        body: ResponseBody::Buffered(entry.body),
                    };
                }
                tracing::debug!(key = %key, "Cache entry failed revalidation; evicting");
                self.cache.evict(key).await;
            }
        }

        let mut ctx = MethodContext::new(Arc::clone(&request), Arc::clone(&binding.descriptor));

        // Authorization phase: authentication first, first Stop wins.
        let mut passed_validators = Vec::new();
        for behavior in registry::authorizing_order(&binding.chain) {
            let Some(secure) = behavior.as_secure() else {
                continue;
            };
            match secure.on_authorizing(&mut ctx).await {
                BehaviorResult::Execute => passed_validators.push(Arc::clone(&behavior)),
                BehaviorResult::Stop {
                    status,
                    description,
                } => {
                    return Self::stop_response(&ctx, status, &description, true);
                }
            }
        }

        // Resource binding happens after authorization so unauthorized
        // payloads are never parsed.
        if !request.body().is_empty() {
            let bound = negotiate_reader(
                request.content_type(),
                &binding.formatters,
                &self.formatters,
            )
            .and_then(|formatter| formatter.read(request.body()));
            match bound {
                Ok(resource) => ctx.set_resource(resource),
                Err(error) => return self.error_response(&ctx, &binding, error),
            }
        }

        // Executing phase, in chain order.
        for behavior in &binding.chain {
            if let BehaviorResult::Stop {
                status,
                description,
            } = behavior.on_executing(&mut ctx).await
            {
                return Self::stop_response(&ctx, status, &description, false);
            }
        }

        let timeout = invoker::effective_timeout(&binding, self.method_timeout);
        let returned = match invoker::invoke(&binding, &ctx, timeout).await {
            Ok(returned) => returned,
            Err(error) => return self.handle_error(&mut ctx, &binding, error).await,
        };

        // Executed phase unwinds in reverse order.
        for behavior in binding.chain.iter().rev() {
            behavior.on_executed(&mut ctx, &returned).await;
        }

        let result = match self.to_result(&request, &binding, returned) {
            Ok(result) => result,
            Err(error) => return self.handle_error(&mut ctx, &binding, error).await,
        };

        let response = match execute_result(result, &ctx.response, &self.config().json).await {
            Ok(response) => response,
            Err(error) => return self.handle_error(&mut ctx, &binding, error).await,
        };

        if let (Some(key), Some(policy)) = (cache_key, binding.cache) {
            if response.status.is_success() {
                if let Some(body) = response.body_bytes() {
                    let lifetime = policy.duration.unwrap_or(self.cache_duration);
                    self.cache
                        .store(
                            key,
                            CacheEntry::new(
                                response.status,
                                response.headers.clone(),
                                body.clone(),
                                lifetime,
                                passed_validators,
                            ),
                        )
                        .await;
                }
            }
        }

        response
    }

    /// Re-run every captured authorization against the current request.
    async fn revalidate(
        &self,
        entry: &CacheEntry,
        request: &Arc<ServiceRequest>,
        binding: &RouteBinding,
    ) -> bool {
        for validator in &entry.validators {
            let Some(secure) = validator.as_secure() else {
                continue;
            };
            let mut probe =
                MethodContext::new(Arc::clone(request), Arc::clone(&binding.descriptor));
            if let BehaviorResult::Stop { .. } = secure.on_authorizing(&mut probe).await {
                return false;
            }
        }
        true
    }

    /// Turn a `Stop` into a response. During authorization an already-set
    /// 401 survives the behavior's configured status, so multi-step
    /// challenges (e.g. a stale Digest nonce) keep their semantics.
    fn stop_response(
        ctx: &MethodContext,
        status: StatusCode,
        description: &str,
        preserve_unauthorized: bool,
    ) -> ServiceResponse {
        let status = if preserve_unauthorized
            && ctx.response.status() == Some(StatusCode::UNAUTHORIZED)
        {
            StatusCode::UNAUTHORIZED
        } else {
            status
        };
        ServiceResponse::plain(status, description, ctx.response.headers().clone())
    }

    /// Convert a method return into a writable result, content-negotiating
    /// plain values.
    fn to_result(
        &self,
        request: &ServiceRequest,
        binding: &RouteBinding,
        returned: MethodReturn,
    ) -> Result<ServiceResult, ServiceError> {
        match returned {
            MethodReturn::Result(result) => Ok(result),
            MethodReturn::None => Ok(ServiceResult::NoContent),
            MethodReturn::Value(value) => {
                let default_media_type = binding
                    .default_media_type
                    .as_deref()
                    .unwrap_or(&self.config().default_media_type);
                let formatter = negotiate_writer(
                    request.accept(),
                    &binding.formatters,
                    &self.formatters,
                    default_media_type,
                )?;
                let body = formatter.write(&value)?;
                Ok(ServiceResult::Content {
                    body,
                    content_type: formatter.content_type().to_string(),
                    clear_headers: false,
                })
            }
        }
    }

    /// Offer a failure to the chain's exception hooks, then fall back to the
    /// default error mapping. Direct-response errors skip the hooks.
    async fn handle_error(
        &self,
        ctx: &mut MethodContext,
        binding: &Arc<RouteBinding>,
        error: ServiceError,
    ) -> ServiceResponse {
        if let ServiceError::Http { status, message } = &error {
            return ServiceResponse::plain(*status, message, ctx.response.headers().clone());
        }

        for behavior in &binding.chain {
            if let ExceptionOutcome::Handle(result) = behavior.on_exception(ctx, &error).await {
                tracing::debug!(error = %error, "Exception handled by behavior");
                match execute_result(result, &ctx.response, &self.config().json).await {
                    Ok(response) => return response,
                    Err(inner) => {
                        tracing::error!(error = %inner, "Exception-handling result failed");
                        return ServiceResponse::plain(
                            StatusCode::INTERNAL_SERVER_ERROR,
                            "Internal Server Error",
                            ctx.response.headers().clone(),
                        );
                    }
                }
            }
        }

        self.error_response(ctx, binding, error)
    }

    /// Default mapping from an error to a response. Validation faults are
    /// serialized through the negotiated formatter; everything else renders
    /// as plain status text.
    fn error_response(
        &self,
        ctx: &MethodContext,
        binding: &RouteBinding,
        error: ServiceError,
    ) -> ServiceResponse {
        let status = error.status();
        match &error {
            ServiceError::Validation(faults) => {
                let default_media_type = binding
                    .default_media_type
                    .as_deref()
                    .unwrap_or(&self.config().default_media_type);
                let serialized = negotiate_writer(
                    ctx.request().accept(),
                    &binding.formatters,
                    &self.formatters,
                    default_media_type,
                )
                .and_then(|formatter| {
                    let value = serde_json::to_value(faults)
                        .map_err(|e| ServiceError::internal(e.to_string()))?;
                    Ok((formatter.content_type().to_string(), formatter.write(&value)?))
                });

                match serialized {
                    Ok((content_type, body)) => {
                        let mut headers = ctx.response.headers().clone();
                        if let Ok(value) = http::HeaderValue::from_str(&content_type) {
                            headers.insert(header::CONTENT_TYPE, value);
                        }
                        ServiceResponse {
                            status,
                            headers,
                            body: ResponseBody::Buffered(body),
                        }
                    }
                    Err(_) => ServiceResponse::plain(
                        status,
                        "resource validation failed",
                        ctx.response.headers().clone(),
                    ),
                }
            }
            ServiceError::Internal(_) => ServiceResponse::plain(
                status,
                "Internal Server Error",
                ctx.response.headers().clone(),
            ),
            other => {
                ServiceResponse::plain(status, &other.to_string(), ctx.response.headers().clone())
            }
        }
    }
}

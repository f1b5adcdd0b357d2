//! Per-request value objects passed through the behavior pipeline.
//!
//! A `MethodContext` lives for exactly one dispatch: behaviors and the
//! invoker see it by reference, the response is assembled from it, and it is
//! dropped at request end. The underlying `ServiceRequest` is immutable and
//! shared (`Arc`) so handler futures can own a view of it without copying.

use std::{
    collections::HashMap,
    net::{IpAddr, SocketAddr},
    sync::Arc,
};

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{
    core::router::RouteDescriptor,
    errors::{FaultCollection, ServiceError},
};

/// Immutable view of one inbound HTTP request.
#[derive(Debug, Clone)]
pub struct ServiceRequest {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    remote_addr: Option<SocketAddr>,
    server_port: u16,
    secure: bool,
    body: Bytes,
    path_params: HashMap<String, String>,
}

impl ServiceRequest {
    pub fn builder(method: Method, uri: Uri) -> ServiceRequestBuilder {
        ServiceRequestBuilder {
            method,
            uri,
            headers: HeaderMap::new(),
            remote_addr: None,
            server_port: 80,
            secure: false,
            body: Bytes::new(),
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// First value of a header as UTF-8, if present and valid.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    pub fn remote_ip(&self) -> Option<IpAddr> {
        self.remote_addr.map(|addr| addr.ip())
    }

    pub fn server_port(&self) -> u16 {
        self.server_port
    }

    /// Whether the request arrived over TLS, directly or behind a proxy that
    /// sets `X-Forwarded-Proto`.
    pub fn is_secure(&self) -> bool {
        self.secure
            || self
                .header("x-forwarded-proto")
                .is_some_and(|proto| proto.eq_ignore_ascii_case("https"))
    }

    pub fn is_ajax(&self) -> bool {
        self.header("x-requested-with")
            .is_some_and(|v| v.eq_ignore_ascii_case("XMLHttpRequest"))
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn content_type(&self) -> Option<&str> {
        // Strip parameters: "application/json; charset=utf-8" -> "application/json"
        self.header("content-type")
            .map(|ct| ct.split(';').next().unwrap_or(ct).trim())
    }

    pub fn accept(&self) -> Option<&str> {
        self.header("accept")
    }

    /// Value captured for a route template parameter, e.g. `id` in `/users/{id}`.
    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params.get(name).map(String::as_str)
    }

    pub(crate) fn set_path_params(&mut self, params: HashMap<String, String>) {
        self.path_params = params;
    }
}

/// Builder used by the server adapter and by tests to assemble requests.
pub struct ServiceRequestBuilder {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    remote_addr: Option<SocketAddr>,
    server_port: u16,
    secure: bool,
    body: Bytes,
}

impl ServiceRequestBuilder {
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Add a header; silently skipped when the name or value is malformed.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            name.parse::<HeaderName>(),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        } else {
            tracing::warn!("Ignoring invalid request header: {} = {}", name, value);
        }
        self
    }

    pub fn remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    pub fn server_port(mut self, port: u16) -> Self {
        self.server_port = port;
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn build(self) -> ServiceRequest {
        ServiceRequest {
            method: self.method,
            uri: self.uri,
            headers: self.headers,
            remote_addr: self.remote_addr,
            server_port: self.server_port,
            secure: self.secure,
            body: self.body,
            path_params: HashMap::new(),
        }
    }
}

/// Response status and headers accumulated while the pipeline runs.
///
/// Behaviors write here (e.g. `WWW-Authenticate` challenges); the result
/// executor merges it with the executed result at the end of dispatch.
#[derive(Debug, Default, Clone)]
pub struct ResponseState {
    status: Option<StatusCode>,
    headers: HeaderMap,
}

impl ResponseState {
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Set a header; invalid pairs are skipped with a warning.
    pub fn set_header(&mut self, name: &str, value: &str) {
        if let (Ok(name), Ok(value)) = (
            name.parse::<HeaderName>(),
            HeaderValue::from_str(value),
        ) {
            self.headers.insert(name, value);
        } else {
            tracing::warn!("Ignoring invalid response header: {} = {}", name, value);
        }
    }
}

/// The pipeline's view of one service method call.
#[derive(Debug, Clone)]
pub struct MethodContext {
    request: Arc<ServiceRequest>,
    route: Arc<RouteDescriptor>,
    pub response: ResponseState,
    resource: Option<Value>,
    principal: Option<String>,
}

impl MethodContext {
    pub(crate) fn new(request: Arc<ServiceRequest>, route: Arc<RouteDescriptor>) -> Self {
        Self {
            request,
            route,
            response: ResponseState::default(),
            resource: None,
            principal: None,
        }
    }

    pub fn request(&self) -> &ServiceRequest {
        &self.request
    }

    pub fn route(&self) -> &RouteDescriptor {
        &self.route
    }

    /// Deserialized request body, once binding has run.
    pub fn resource(&self) -> Option<&Value> {
        self.resource.as_ref()
    }

    pub(crate) fn set_resource(&mut self, resource: Value) {
        self.resource = Some(resource);
    }

    /// Authenticated identity established by an authentication behavior.
    pub fn principal(&self) -> Option<&str> {
        self.principal.as_deref()
    }

    pub fn set_principal(&mut self, principal: impl Into<String>) {
        self.principal = Some(principal.into());
    }

    pub(crate) fn to_args(&self) -> MethodArgs {
        MethodArgs {
            request: Arc::clone(&self.request),
            route: Arc::clone(&self.route),
            resource: self.resource.clone(),
            principal: self.principal.clone(),
        }
    }
}

/// Owned snapshot of the context handed to a service method, so handler
/// futures are `'static` and can be raced against a timeout.
#[derive(Debug, Clone)]
pub struct MethodArgs {
    pub request: Arc<ServiceRequest>,
    pub route: Arc<RouteDescriptor>,
    pub resource: Option<Value>,
    pub principal: Option<String>,
}

impl MethodArgs {
    /// Bind the deserialized request body to a concrete type.
    ///
    /// A missing body or a shape mismatch is a resource-binding fault, not an
    /// internal error.
    pub fn resource_as<T: DeserializeOwned>(&self) -> Result<T, ServiceError> {
        let value = self.resource.clone().ok_or_else(|| {
            ServiceError::Validation(FaultCollection::general("request body is required"))
        })?;
        serde_json::from_value(value).map_err(|e| {
            ServiceError::Validation(FaultCollection::general(format!(
                "request body does not match the expected shape: {e}"
            )))
        })
    }

    /// Route template parameter, e.g. `id` in `/users/{id}`.
    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.request.path_param(name)
    }
}

//! Axum middleware bridging transport requests into request-scoped tracing.
//!
//! A single layer owns the request-span lifecycle: it generates the request
//! id, opens the span from `tracing_setup`, records status and latency once
//! the response is ready, and echoes the id to clients via `X-Request-ID`.
//! HTTP start/finish logging itself is tower-http's `TraceLayer`, attached
//! by the server adapter.

use std::time::Instant;

use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use tracing::Instrument;

use crate::tracing_setup::create_request_span;

/// Run the rest of the stack inside a request span carrying a fresh UUID,
/// then record the outcome on it.
pub async fn request_span_middleware(req: Request, next: Next) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    let span = create_request_span(req.method().as_str(), req.uri().path(), &request_id);

    let start = Instant::now();
    let mut response = next.run(req).instrument(span.clone()).await;

    span.record("http.status_code", response.status().as_u16() as u64);
    span.record("duration_ms", start.elapsed().as_millis() as u64);

    if let Ok(header_value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("X-Request-ID", header_value);
    }

    response
}

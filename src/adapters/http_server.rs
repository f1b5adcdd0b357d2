//! Axum/hyper server adapter.
//!
//! Bridges the transport to the framework: collects the request body (capped
//! by configuration), captures the client address, hands a `ServiceRequest`
//! to the dispatcher, and writes the resulting response back. Compression
//! and HTTP-level tracing are tower-http layers here, not pipeline concerns.

use std::{net::SocketAddr, sync::Arc};

use axum::{
    Router,
    body::Body,
    extract::{ConnectInfo, Request},
    response::Response,
};
use eyre::{Result, WrapErr};
use http::StatusCode;
use tower_http::{compression::CompressionLayer, trace::TraceLayer};

use crate::{
    adapters::middleware::request_span_middleware,
    core::{context::ServiceRequest, service::RestService},
    utils::GracefulShutdown,
};

/// HTTP server adapter for a [`RestService`].
pub struct HttpServerAdapter {
    service: Arc<RestService>,
}

impl HttpServerAdapter {
    pub fn new(service: Arc<RestService>) -> Self {
        Self { service }
    }

    /// Build the Axum router: a single fallback into the dispatcher plus the
    /// standard layers.
    pub fn router(&self) -> Router {
        let service = Arc::clone(&self.service);
        let server_port = self
            .service
            .config()
            .listen_addr
            .parse::<SocketAddr>()
            .map(|addr| addr.port())
            .unwrap_or(80);

        Router::new()
            .fallback(move |req: Request| {
                let service = Arc::clone(&service);
                async move { handle(service, req, server_port).await }
            })
            .layer(axum::middleware::from_fn(request_span_middleware))
            .layer(CompressionLayer::new())
            .layer(TraceLayer::new_for_http())
    }

    /// Bind the configured address and serve until an OS signal arrives.
    pub async fn serve(&self) -> Result<()> {
        let timeout = humantime::parse_duration(&self.service.config().shutdown_timeout)
            .unwrap_or_else(|_| std::time::Duration::from_secs(30));
        let shutdown = Arc::new(GracefulShutdown::with_timeout(timeout));

        let signals = Arc::clone(&shutdown);
        tokio::spawn(async move { signals.listen_for_signals().await });

        self.serve_with_shutdown(shutdown).await
    }

    /// Serve until the given shutdown manager fires. Once shutdown is
    /// requested, in-flight requests get the manager's timeout to finish;
    /// connections still open after that are dropped.
    pub async fn serve_with_shutdown(&self, shutdown: Arc<GracefulShutdown>) -> Result<()> {
        let addr = &self.service.config().listen_addr;
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .wrap_err_with(|| format!("Failed to bind {addr}"))?;

        tracing::info!(listen_addr = %addr, "Serving REST service");

        let wait = Arc::clone(&shutdown);
        let graceful = axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move { wait.wait().await });

        let deadline = Arc::clone(&shutdown);
        tokio::select! {
            result = graceful => {
                result.wrap_err("Server error")?;
                tracing::info!("Server stopped");
            }
            _ = async move {
                deadline.wait().await;
                tokio::time::sleep(deadline.shutdown_timeout()).await;
            } => {
                tracing::warn!(
                    timeout = ?shutdown.shutdown_timeout(),
                    "Shutdown deadline exceeded; dropping remaining connections"
                );
            }
        }

        Ok(())
    }
}

async fn handle(service: Arc<RestService>, req: Request, server_port: u16) -> Response {
    let max_body_bytes = service.config().max_body_bytes;
    let (parts, body) = req.into_parts();

    let remote_addr = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|connect_info| connect_info.0);

    let body = match axum::body::to_bytes(body, max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!("Rejecting oversized or unreadable request body: {}", e);
            return plain_response(StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large");
        }
    };

    let mut builder = ServiceRequest::builder(parts.method, parts.uri)
        .headers(parts.headers)
        .server_port(server_port)
        .body(body);
    if let Some(addr) = remote_addr {
        builder = builder.remote_addr(addr);
    }

    service.dispatch(builder.build()).await.into_axum()
}

fn plain_response(status: StatusCode, message: &str) -> Response {
    let mut response = Response::new(Body::from(message.to_string()));
    *response.status_mut() = status;
    response
}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt;
    use serde_json::json;
    use tower::ServiceExt; // for oneshot

    use super::*;
    use crate::{
        config::FrameworkConfig,
        core::service::Route,
        ports::MethodReturn,
        utils::ShutdownReason,
    };

    fn service() -> Arc<RestService> {
        Arc::new(
            RestService::builder(FrameworkConfig::default())
                .route(Route::get("/ping").handle(|_, _| async {
                    MethodReturn::value(json!({"pong": true}))
                }))
                .build()
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_dispatches_through_the_router() {
        let adapter = HttpServerAdapter::new(service());
        let response = adapter
            .router()
            .oneshot(
                Request::builder()
                    .uri("/ping")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("X-Request-ID"));

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["pong"], true);
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let adapter = HttpServerAdapter::new(service());
        let response = adapter
            .router()
            .oneshot(
                Request::builder()
                    .uri("/nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let mut config = FrameworkConfig::default();
        config.max_body_bytes = 8;
        let service = Arc::new(
            RestService::builder(config)
                .route(Route::post("/in").handle(|_, _| async { Ok(MethodReturn::None) }))
                .build()
                .unwrap(),
        );

        let adapter = HttpServerAdapter::new(service);
        let response = adapter
            .router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/in")
                    .body(Body::from(vec![0u8; 64]))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_serve_with_shutdown_stops_on_trigger() {
        use std::time::Duration;

        let mut config = FrameworkConfig::default();
        config.listen_addr = "127.0.0.1:0".to_string();
        let service = Arc::new(
            RestService::builder(config)
                .route(Route::get("/ping").handle(|_, _| async { Ok(MethodReturn::None) }))
                .build()
                .unwrap(),
        );

        let adapter = HttpServerAdapter::new(service);
        let shutdown = Arc::new(GracefulShutdown::with_timeout(Duration::from_millis(250)));

        let trigger = Arc::clone(&shutdown);
        let server = tokio::spawn(async move { adapter.serve_with_shutdown(shutdown).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.trigger_shutdown(ShutdownReason::Graceful).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(2), server)
            .await
            .expect("server exits after shutdown")
            .expect("server task joins");
        assert!(result.is_ok());
    }
}

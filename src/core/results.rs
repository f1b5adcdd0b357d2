//! Typed results and the result executor.
//!
//! A service method can return a plain value (content-negotiated by the
//! result factory) or one of these typed results for explicit control over
//! the response. The executor is the single place that turns a result into
//! status, headers, and body; streaming bodies (files, readers) are only
//! materialized when the response is written.

use std::{fmt, path::PathBuf, sync::OnceLock};

use bytes::Bytes;
use http::{StatusCode, header};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;

use crate::{
    adapters::formatters::{BsonFormatter, JsonFormatter, XmlFormatter},
    config::JsonOptions,
    core::{
        context::ResponseState,
        feed::{Feed, FeedFormat},
    },
    errors::ServiceError,
    ports::MediaTypeFormatter,
};

/// Callback names must be a dotted chain of JavaScript identifiers.
fn jsonp_callback_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*(\.[A-Za-z_$][A-Za-z0-9_$]*)*$")
            .expect("hardcoded pattern compiles")
    })
}

/// A response the executor knows how to write.
pub enum ServiceResult {
    /// Raw bytes with an explicit content type. `clear_headers` drops any
    /// headers behaviors accumulated, giving the result full control of the
    /// output.
    Content {
        body: Bytes,
        content_type: String,
        clear_headers: bool,
    },
    Json(Value),
    Xml(Value),
    Bson(Value),
    Jsonp { value: Value, callback: String },
    Feed { feed: Feed, format: FeedFormat },
    File {
        path: PathBuf,
        content_type: Option<String>,
    },
    Stream {
        reader: Box<dyn AsyncRead + Send + Unpin + 'static>,
        content_type: String,
    },
    Redirect { location: String, permanent: bool },
    Status {
        status: StatusCode,
        description: String,
    },
    NoContent,
}

impl ServiceResult {
    pub fn content(body: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        ServiceResult::Content {
            body: body.into(),
            content_type: content_type.into(),
            clear_headers: false,
        }
    }

    pub fn json<T: Serialize>(value: T) -> Result<Self, ServiceError> {
        Ok(ServiceResult::Json(to_value(value)?))
    }

    pub fn xml<T: Serialize>(value: T) -> Result<Self, ServiceError> {
        Ok(ServiceResult::Xml(to_value(value)?))
    }

    pub fn bson<T: Serialize>(value: T) -> Result<Self, ServiceError> {
        Ok(ServiceResult::Bson(to_value(value)?))
    }

    pub fn jsonp<T: Serialize>(value: T, callback: impl Into<String>) -> Result<Self, ServiceError> {
        Ok(ServiceResult::Jsonp {
            value: to_value(value)?,
            callback: callback.into(),
        })
    }

    pub fn feed(feed: Feed, format: FeedFormat) -> Self {
        ServiceResult::Feed { feed, format }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        ServiceResult::File {
            path: path.into(),
            content_type: None,
        }
    }

    pub fn stream(
        reader: impl AsyncRead + Send + Unpin + 'static,
        content_type: impl Into<String>,
    ) -> Self {
        ServiceResult::Stream {
            reader: Box::new(reader),
            content_type: content_type.into(),
        }
    }

    pub fn redirect(location: impl Into<String>) -> Self {
        ServiceResult::Redirect {
            location: location.into(),
            permanent: false,
        }
    }

    pub fn redirect_permanent(location: impl Into<String>) -> Self {
        ServiceResult::Redirect {
            location: location.into(),
            permanent: true,
        }
    }

    pub fn status(status: StatusCode, description: impl Into<String>) -> Self {
        ServiceResult::Status {
            status,
            description: description.into(),
        }
    }
}

fn to_value<T: Serialize>(value: T) -> Result<Value, ServiceError> {
    serde_json::to_value(value)
        .map_err(|e| ServiceError::internal(format!("result value not serializable: {e}")))
}

impl fmt::Debug for ServiceResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceResult::Content { content_type, body, .. } => f
                .debug_struct("Content")
                .field("content_type", content_type)
                .field("len", &body.len())
                .finish(),
            ServiceResult::Json(_) => f.write_str("Json"),
            ServiceResult::Xml(_) => f.write_str("Xml"),
            ServiceResult::Bson(_) => f.write_str("Bson"),
            ServiceResult::Jsonp { callback, .. } => {
                f.debug_struct("Jsonp").field("callback", callback).finish()
            }
            ServiceResult::Feed { format, .. } => {
                f.debug_struct("Feed").field("format", format).finish()
            }
            ServiceResult::File { path, .. } => {
                f.debug_struct("File").field("path", path).finish()
            }
            ServiceResult::Stream { content_type, .. } => f
                .debug_struct("Stream")
                .field("content_type", content_type)
                .finish(),
            ServiceResult::Redirect { location, permanent } => f
                .debug_struct("Redirect")
                .field("location", location)
                .field("permanent", permanent)
                .finish(),
            ServiceResult::Status { status, .. } => {
                f.debug_struct("Status").field("status", status).finish()
            }
            ServiceResult::NoContent => f.write_str("NoContent"),
        }
    }
}

/// Response body produced by the executor.
pub enum ResponseBody {
    Empty,
    Buffered(Bytes),
    Stream(Box<dyn AsyncRead + Send + Unpin + 'static>),
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseBody::Empty => f.write_str("Empty"),
            ResponseBody::Buffered(bytes) => {
                f.debug_tuple("Buffered").field(&bytes.len()).finish()
            }
            ResponseBody::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// The fully assembled response handed back to the server adapter.
#[derive(Debug)]
pub struct ServiceResponse {
    pub status: StatusCode,
    pub headers: http::HeaderMap,
    pub body: ResponseBody,
}

impl ServiceResponse {
    pub(crate) fn plain(
        status: StatusCode,
        description: &str,
        headers: http::HeaderMap,
    ) -> Self {
        let mut response = Self {
            status,
            headers,
            body: ResponseBody::Buffered(Bytes::from(description.as_bytes().to_vec())),
        };
        response.headers.insert(
            header::CONTENT_TYPE,
            http::HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        response
    }

    /// Buffered body bytes, when the response is not streaming.
    pub fn body_bytes(&self) -> Option<&Bytes> {
        match &self.body {
            ResponseBody::Buffered(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn into_axum(self) -> axum::response::Response {
        let body = match self.body {
            ResponseBody::Empty => axum::body::Body::empty(),
            ResponseBody::Buffered(bytes) => axum::body::Body::from(bytes),
            ResponseBody::Stream(reader) => {
                axum::body::Body::from_stream(ReaderStream::new(reader))
            }
        };
        let mut response = axum::response::Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

fn set_content_type(headers: &mut http::HeaderMap, content_type: &str) {
    match http::HeaderValue::from_str(content_type) {
        Ok(value) => {
            headers.insert(header::CONTENT_TYPE, value);
        }
        Err(_) => {
            tracing::warn!("Invalid content type on result: {}", content_type);
        }
    }
}

fn guess_media_type(path: &std::path::Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("html") | Some("htm") => "text/html; charset=utf-8",
        Some("css") => "text/css",
        Some("js") => "application/javascript",
        Some("json") => "application/json",
        Some("xml") => "application/xml",
        Some("txt") => "text/plain; charset=utf-8",
        Some("csv") => "text/csv",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}

/// Write a result into a `ServiceResponse`, merging the status and headers
/// behaviors accumulated on the response state.
pub(crate) async fn execute_result(
    result: ServiceResult,
    state: &ResponseState,
    json: &JsonOptions,
) -> Result<ServiceResponse, ServiceError> {
    let base_status = state.status();
    let headers = state.headers().clone();

    match result {
        ServiceResult::Content {
            body,
            content_type,
            clear_headers,
        } => {
            let mut headers = if clear_headers {
                http::HeaderMap::new()
            } else {
                headers
            };
            set_content_type(&mut headers, &content_type);
            Ok(ServiceResponse {
                status: base_status.unwrap_or(StatusCode::OK),
                headers,
                body: ResponseBody::Buffered(body),
            })
        }
        ServiceResult::Json(value) => {
            let formatter = JsonFormatter::new(*json);
            buffered(formatter.write(&value)?, formatter.content_type(), base_status, headers)
        }
        ServiceResult::Xml(value) => {
            let formatter = XmlFormatter::new();
            buffered(formatter.write(&value)?, formatter.content_type(), base_status, headers)
        }
        ServiceResult::Bson(value) => {
            let formatter = BsonFormatter::new();
            buffered(formatter.write(&value)?, formatter.content_type(), base_status, headers)
        }
        ServiceResult::Jsonp { value, callback } => {
            if !jsonp_callback_pattern().is_match(&callback) {
                return Err(ServiceError::bad_request(format!(
                    "invalid JSONP callback name '{callback}'"
                )));
            }
            let payload = serde_json::to_string(&value)
                .map_err(|e| ServiceError::internal(format!("JSONP payload: {e}")))?;
            let body = format!("{callback}({payload});");
            buffered(
                Bytes::from(body),
                "application/javascript; charset=utf-8",
                base_status,
                headers,
            )
        }
        ServiceResult::Feed { feed, format } => buffered(
            Bytes::from(feed.render(format)),
            format.content_type(),
            base_status,
            headers,
        ),
        ServiceResult::File { path, content_type } => {
            let metadata = tokio::fs::metadata(&path)
                .await
                .map_err(|_| ServiceError::not_found(format!("{} not found", path.display())))?;
            if !metadata.is_file() {
                return Err(ServiceError::not_found(format!(
                    "{} is not a file",
                    path.display()
                )));
            }
            let file = tokio::fs::File::open(&path)
                .await
                .map_err(|e| ServiceError::internal(format!("open {}: {e}", path.display())))?;
            let mut headers = headers;
            let content_type = content_type.unwrap_or_else(|| guess_media_type(&path).to_string());
            set_content_type(&mut headers, &content_type);
            if let Ok(len) = http::HeaderValue::from_str(&metadata.len().to_string()) {
                headers.insert(header::CONTENT_LENGTH, len);
            }
            Ok(ServiceResponse {
                status: base_status.unwrap_or(StatusCode::OK),
                headers,
                body: ResponseBody::Stream(Box::new(file)),
            })
        }
        ServiceResult::Stream {
            reader,
            content_type,
        } => {
            let mut headers = headers;
            set_content_type(&mut headers, &content_type);
            Ok(ServiceResponse {
                status: base_status.unwrap_or(StatusCode::OK),
                headers,
                body: ResponseBody::Stream(reader),
            })
        }
        ServiceResult::Redirect {
            location,
            permanent,
        } => {
            let mut headers = headers;
            match http::HeaderValue::from_str(&location) {
                Ok(value) => {
                    headers.insert(header::LOCATION, value);
                }
                Err(_) => {
                    return Err(ServiceError::internal(format!(
                        "redirect location is not a valid header value: {location}"
                    )));
                }
            }
            Ok(ServiceResponse {
                status: if permanent {
                    StatusCode::MOVED_PERMANENTLY
                } else {
                    StatusCode::FOUND
                },
                headers,
                body: ResponseBody::Empty,
            })
        }
        ServiceResult::Status {
            status,
            description,
        } => Ok(ServiceResponse::plain(status, &description, headers)),
        ServiceResult::NoContent => Ok(ServiceResponse {
            status: base_status.unwrap_or(StatusCode::NO_CONTENT),
            headers,
            body: ResponseBody::Empty,
        }),
    }
}

fn buffered(
    body: Bytes,
    content_type: &str,
    base_status: Option<StatusCode>,
    mut headers: http::HeaderMap,
) -> Result<ServiceResponse, ServiceError> {
    set_content_type(&mut headers, content_type);
    Ok(ServiceResponse {
        status: base_status.unwrap_or(StatusCode::OK),
        headers,
        body: ResponseBody::Buffered(body),
    })
}

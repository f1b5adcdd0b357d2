//! Adapters: transport and wire-format implementations of the ports.

pub mod formatters;
pub mod http_server;
pub mod middleware;

pub use formatters::{BsonFormatter, FormUrlEncodedFormatter, JsonFormatter, XmlFormatter};
pub use http_server::HttpServerAdapter;

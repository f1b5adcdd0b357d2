//! Configuration data structures for Synapse.
//!
//! These types map directly to TOML (also JSON / YAML) configuration files. They are
//! intentionally serde‑friendly and include defaults so that minimal configs remain concise.
//! Builders and enums here are considered part of the public API for embedding.
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Default function for the negotiated fallback media type
fn default_media_type() -> String {
    "application/json".to_string()
}

/// JSON formatter options.
#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct JsonOptions {
    /// Drop null-valued object members when writing responses
    pub omit_nulls: bool,
    /// Pretty-print response bodies (diagnostic use)
    pub pretty: bool,
}

impl Default for JsonOptions {
    fn default() -> Self {
        Self {
            omit_nulls: false,
            pretty: false,
        }
    }
}

/// Quality-of-protection mode for Digest authentication.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QopMode {
    /// Legacy RFC 2069 style response hash, no client nonce required
    None,
    /// `qop="auth"`: client nonce and nonce counter enter the response hash
    Auth,
}

/// Digest authentication configuration.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct DigestOptions {
    /// Protection realm advertised in challenges
    pub realm: String,
    /// How long a server nonce stays fresh (humantime string, e.g. "2m")
    pub nonce_lifetime: String,
    /// Quality-of-protection mode
    pub qop: QopMode,
}

impl Default for DigestOptions {
    fn default() -> Self {
        Self {
            realm: "synapse".to_string(),
            nonce_lifetime: "2m".to_string(),
            qop: QopMode::Auth,
        }
    }
}

/// Throttling configuration: one request per client per window.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ThrottleOptions {
    /// Minimum delay between requests from one client to one path
    /// (humantime string, e.g. "500ms")
    pub window: String,
    /// Status code returned on rejection
    pub status_code: u16,
    /// Response body returned on rejection
    pub message: String,
}

impl Default for ThrottleOptions {
    fn default() -> Self {
        Self {
            window: "1s".to_string(),
            status_code: 429,
            message: "Too Many Requests".to_string(),
        }
    }
}

/// Output cache configuration.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct CacheOptions {
    /// Default entry lifetime when a route enables caching without its own
    /// duration (humantime string)
    pub duration: String,
    /// Include the query string in the cache key
    pub vary_query: bool,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            duration: "30s".to_string(),
            vary_query: true,
        }
    }
}

/// Top-level framework configuration.
///
/// An instance is built once at startup and shared immutably with the
/// dispatcher; there is no runtime reload.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FrameworkConfig {
    /// Address the server adapter binds to
    pub listen_addr: String,
    /// Fallback media type when the client sends no `Accept` header or `*/*`
    #[serde(default = "default_media_type")]
    pub default_media_type: String,
    /// Global service-method timeout (humantime string); absent or "0s"
    /// means no timeout. Routes may override.
    #[serde(default)]
    pub method_timeout: Option<String>,
    /// Maximum accepted request body size in bytes
    #[serde(default = "FrameworkConfig::default_max_body_bytes")]
    pub max_body_bytes: usize,
    #[serde(default)]
    pub json: JsonOptions,
    #[serde(default)]
    pub digest: DigestOptions,
    #[serde(default)]
    pub throttle: ThrottleOptions,
    #[serde(default)]
    pub cache: CacheOptions,
    /// Named IP allow-lists consumed by the ACL behavior; values are IPs or
    /// CIDR ranges
    #[serde(default)]
    pub acl: HashMap<String, Vec<String>>,
    /// Maximum time to wait for in-flight requests on shutdown
    #[serde(default = "FrameworkConfig::default_shutdown_timeout")]
    pub shutdown_timeout: String,
}

impl FrameworkConfig {
    fn default_max_body_bytes() -> usize {
        2 * 1024 * 1024
    }

    fn default_shutdown_timeout() -> String {
        "30s".to_string()
    }

    /// Create a new framework configuration builder
    pub fn builder() -> FrameworkConfigBuilder {
        FrameworkConfigBuilder::default()
    }
}

impl Default for FrameworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
            default_media_type: default_media_type(),
            method_timeout: None,
            max_body_bytes: Self::default_max_body_bytes(),
            json: JsonOptions::default(),
            digest: DigestOptions::default(),
            throttle: ThrottleOptions::default(),
            cache: CacheOptions::default(),
            acl: HashMap::new(),
            shutdown_timeout: Self::default_shutdown_timeout(),
        }
    }
}

/// Builder for FrameworkConfig to allow for cleaner configuration creation
pub struct FrameworkConfigBuilder {
    listen_addr: Option<String>,
    default_media_type: Option<String>,
    method_timeout: Option<String>,
    max_body_bytes: Option<usize>,
    json: Option<JsonOptions>,
    digest: Option<DigestOptions>,
    throttle: Option<ThrottleOptions>,
    cache: Option<CacheOptions>,
    acl: HashMap<String, Vec<String>>,
    shutdown_timeout: Option<String>,
}

impl Default for FrameworkConfigBuilder {
    fn default() -> Self {
        Self {
            listen_addr: None,
            default_media_type: None,
            method_timeout: None,
            max_body_bytes: None,
            json: None,
            digest: None,
            throttle: None,
            cache: None,
            acl: HashMap::new(),
            shutdown_timeout: None,
        }
    }
}

impl FrameworkConfigBuilder {
    /// Set the listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.listen_addr = Some(addr.into());
        self
    }

    /// Set the fallback media type used when negotiation has nothing to go on
    pub fn default_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.default_media_type = Some(media_type.into());
        self
    }

    /// Set the global service-method timeout as a humantime string
    pub fn method_timeout(mut self, timeout: impl Into<String>) -> Self {
        self.method_timeout = Some(timeout.into());
        self
    }

    /// Set the maximum accepted request body size
    pub fn max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = Some(limit);
        self
    }

    /// Set JSON formatter options
    pub fn json(mut self, options: JsonOptions) -> Self {
        self.json = Some(options);
        self
    }

    /// Set Digest authentication options
    pub fn digest(mut self, options: DigestOptions) -> Self {
        self.digest = Some(options);
        self
    }

    /// Set throttling options
    pub fn throttle(mut self, options: ThrottleOptions) -> Self {
        self.throttle = Some(options);
        self
    }

    /// Set output cache options
    pub fn cache(mut self, options: CacheOptions) -> Self {
        self.cache = Some(options);
        self
    }

    /// Add a named IP allow-list section
    pub fn acl_section(
        mut self,
        name: impl Into<String>,
        entries: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.acl
            .insert(name.into(), entries.into_iter().map(Into::into).collect());
        self
    }

    /// Set the graceful shutdown timeout as a humantime string
    pub fn shutdown_timeout(mut self, timeout: impl Into<String>) -> Self {
        self.shutdown_timeout = Some(timeout.into());
        self
    }

    /// Build the final FrameworkConfig
    pub fn build(self) -> FrameworkConfig {
        let defaults = FrameworkConfig::default();
        FrameworkConfig {
            listen_addr: self.listen_addr.unwrap_or(defaults.listen_addr),
            default_media_type: self.default_media_type.unwrap_or(defaults.default_media_type),
            method_timeout: self.method_timeout.or(defaults.method_timeout),
            max_body_bytes: self.max_body_bytes.unwrap_or(defaults.max_body_bytes),
            json: self.json.unwrap_or(defaults.json),
            digest: self.digest.unwrap_or(defaults.digest),
            throttle: self.throttle.unwrap_or(defaults.throttle),
            cache: self.cache.unwrap_or(defaults.cache),
            acl: self.acl,
            shutdown_timeout: self.shutdown_timeout.unwrap_or(defaults.shutdown_timeout),
        }
    }
}

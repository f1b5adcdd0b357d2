//! Configuration: serde models, file loading, and structural validation.

pub mod loader;
pub mod models;
pub mod validation;

pub use models::{
    CacheOptions, DigestOptions, FrameworkConfig, FrameworkConfigBuilder, JsonOptions, QopMode,
    ThrottleOptions,
};
pub use validation::{FrameworkConfigValidator, ValidationError};

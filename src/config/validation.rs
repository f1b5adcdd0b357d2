use std::net::SocketAddr;

use crate::{config::models::FrameworkConfig, core::auth::IpNetwork};

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone)]
pub enum ValidationError {
    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid listen address '{address}': {reason}")]
    InvalidListenAddress { address: String, reason: String },

    #[error("Invalid duration in '{field}': {message}")]
    InvalidDuration { field: String, message: String },

    #[error("Invalid ACL section '{section}': {message}")]
    InvalidAcl { section: String, message: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Framework configuration validator
pub struct FrameworkConfigValidator;

impl FrameworkConfigValidator {
    /// Validate the entire framework configuration
    pub fn validate(config: &FrameworkConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_listen_address(&config.listen_addr) {
            errors.push(e);
        }

        if let Err(e) = Self::validate_media_type(&config.default_media_type) {
            errors.push(e);
        }

        if let Some(timeout) = &config.method_timeout {
            if let Err(e) = Self::validate_duration("method_timeout", timeout) {
                errors.push(e);
            }
        }

        for (field, value) in [
            ("digest.nonce_lifetime", &config.digest.nonce_lifetime),
            ("throttle.window", &config.throttle.window),
            ("cache.duration", &config.cache.duration),
            ("shutdown_timeout", &config.shutdown_timeout),
        ] {
            if let Err(e) = Self::validate_duration(field, value) {
                errors.push(e);
            }
        }

        if http::StatusCode::from_u16(config.throttle.status_code).is_err() {
            errors.push(ValidationError::InvalidField {
                field: "throttle.status_code".to_string(),
                message: format!("'{}' is not a valid HTTP status", config.throttle.status_code),
            });
        }

        for (section, entries) in &config.acl {
            if entries.is_empty() {
                errors.push(ValidationError::InvalidAcl {
                    section: section.clone(),
                    message: "allow-list is empty and would forbid every client".to_string(),
                });
            }
            for entry in entries {
                if let Err(e) = IpNetwork::parse(entry) {
                    errors.push(ValidationError::InvalidAcl {
                        section: section.clone(),
                        message: format!("'{entry}': {e}"),
                    });
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    /// Validate listen address format
    fn validate_listen_address(address: &str) -> ValidationResult<()> {
        if address.parse::<SocketAddr>().is_err() {
            return Err(ValidationError::InvalidListenAddress {
                address: address.to_string(),
                reason: "Must be in format 'IP:PORT' (e.g., '127.0.0.1:3000' or '0.0.0.0:8080')"
                    .to_string(),
            });
        }
        Ok(())
    }

    fn validate_media_type(media_type: &str) -> ValidationResult<()> {
        let mut parts = media_type.splitn(2, '/');
        let ty = parts.next().unwrap_or_default();
        let sub = parts.next().unwrap_or_default();
        if ty.is_empty() || sub.is_empty() || sub.contains('/') {
            return Err(ValidationError::InvalidField {
                field: "default_media_type".to_string(),
                message: format!("'{media_type}' is not a type/subtype media type"),
            });
        }
        Ok(())
    }

    fn validate_duration(field: &str, value: &str) -> ValidationResult<()> {
        humantime::parse_duration(value).map_err(|e| ValidationError::InvalidDuration {
            field: field.to_string(),
            message: format!("'{value}': {e}"),
        })?;
        Ok(())
    }

    /// Format multiple validation errors into a single message
    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        errors
            .iter()
            .map(|e| format!("  - {e}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

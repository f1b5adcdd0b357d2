//! Per-client request throttling built atop `governor`.
//!
//! One keyed limiter per behavior instance, keyed by client IP + route path,
//! with a quota of one request per configured window. The limiter state is
//! designed for concurrent access, so a single behavior instance safely
//! serves every request task.

use std::{num::NonZeroU32, time::Duration};

use async_trait::async_trait;
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::keyed::DefaultKeyedStateStore,
};
use http::StatusCode;

use crate::{
    config::{ThrottleOptions, ValidationError},
    core::context::MethodContext,
    ports::{BehaviorResult, SecureServiceBehavior, ServiceBehavior},
};

type KeyedRateLimiterImpl<K> = RateLimiter<K, DefaultKeyedStateStore<K>, DefaultClock>;

/// Rejects a client's second request to the same path within the window.
pub struct ThrottleBehavior {
    limiter: KeyedRateLimiterImpl<String>,
    window: Duration,
    status_code: StatusCode,
    message: String,
}

impl ThrottleBehavior {
    /// Build from configured throttle options.
    pub fn from_config(options: &ThrottleOptions) -> Result<Self, ValidationError> {
        let window = humantime::parse_duration(&options.window).map_err(|e| {
            ValidationError::InvalidDuration {
                field: "throttle.window".to_string(),
                message: format!("'{}': {e}", options.window),
            }
        })?;

        let status_code = StatusCode::from_u16(options.status_code).map_err(|_| {
            ValidationError::InvalidField {
                field: "throttle.status_code".to_string(),
                message: format!("'{}' is not a valid HTTP status", options.status_code),
            }
        })?;

        Self::build(window, status_code, options.message.clone())
    }

    /// One request per `window` with the standard 429 response.
    pub fn new(window: Duration) -> Result<Self, ValidationError> {
        Self::build(
            window,
            StatusCode::TOO_MANY_REQUESTS,
            "Too Many Requests".to_string(),
        )
    }

    fn build(
        window: Duration,
        status_code: StatusCode,
        message: String,
    ) -> Result<Self, ValidationError> {
        let quota = Quota::with_period(window)
            .ok_or_else(|| ValidationError::InvalidDuration {
                field: "throttle.window".to_string(),
                message: "window must be greater than zero".to_string(),
            })?
            .allow_burst(NonZeroU32::MIN);

        tracing::info!(
            window_ms = window.as_millis() as u64,
            status = status_code.as_u16(),
            "Creating throttle limiter"
        );

        Ok(Self {
            limiter: RateLimiter::keyed(quota),
            window,
            status_code,
            message,
        })
    }

    fn retry_after_secs(&self) -> u64 {
        self.window.as_secs().max(1)
    }
}

#[async_trait]
impl ServiceBehavior for ThrottleBehavior {
    fn as_secure(&self) -> Option<&dyn SecureServiceBehavior> {
        Some(self)
    }
}

#[async_trait]
impl SecureServiceBehavior for ThrottleBehavior {
    async fn on_authorizing(&self, ctx: &mut MethodContext) -> BehaviorResult {
        let Some(ip) = ctx.request().remote_ip() else {
            // No key to throttle on; let the request through rather than
            // collapsing every unknown client into one bucket.
            tracing::warn!("Throttle check with unknown client address");
            return BehaviorResult::Execute;
        };

        let key = format!("{ip}|{}", ctx.request().path());
        if self.limiter.check_key(&key).is_ok() {
            BehaviorResult::Execute
        } else {
            ctx.response
                .set_header("retry-after", &self.retry_after_secs().to_string());
            BehaviorResult::stop(self.status_code, self.message.clone())
        }
    }
}

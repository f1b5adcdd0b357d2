//! Basic authentication behavior (RFC 7617).

use std::sync::Arc;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use http::StatusCode;

use crate::{
    core::context::MethodContext,
    ports::{BehaviorResult, CredentialSource, SecureServiceBehavior, ServiceBehavior},
};

/// Validates `Authorization: Basic` credentials against a credential store;
/// anything else challenges with `WWW-Authenticate`.
pub struct BasicAuthBehavior {
    realm: String,
    credentials: Arc<dyn CredentialSource>,
}

impl BasicAuthBehavior {
    pub fn new(realm: impl Into<String>, credentials: Arc<dyn CredentialSource>) -> Self {
        Self {
            realm: realm.into(),
            credentials,
        }
    }

    /// Decode the `user:password` pair from the header value, if well-formed.
    fn decode_credentials(header: &str) -> Option<(String, String)> {
        let encoded = header.strip_prefix("Basic ").or_else(|| header.strip_prefix("basic "))?;
        let decoded = BASE64.decode(encoded.trim()).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (user, password) = decoded.split_once(':')?;
        if user.is_empty() {
            return None;
        }
        Some((user.to_string(), password.to_string()))
    }

    fn challenge(&self, ctx: &mut MethodContext) -> BehaviorResult {
        ctx.response.set_status(StatusCode::UNAUTHORIZED);
        ctx.response.set_header(
            "www-authenticate",
            &format!("Basic realm=\"{}\"", self.realm),
        );
        BehaviorResult::stop(StatusCode::UNAUTHORIZED, "Unauthorized")
    }
}

#[async_trait]
impl ServiceBehavior for BasicAuthBehavior {
    fn as_secure(&self) -> Option<&dyn SecureServiceBehavior> {
        Some(self)
    }
}

#[async_trait]
impl SecureServiceBehavior for BasicAuthBehavior {
    async fn on_authorizing(&self, ctx: &mut MethodContext) -> BehaviorResult {
        let Some((user, password)) = ctx
            .request()
            .header("authorization")
            .and_then(Self::decode_credentials)
        else {
            return self.challenge(ctx);
        };

        match self.credentials.find(&user).await {
            Some(stored) if stored.password == password => {
                ctx.set_principal(user);
                BehaviorResult::Execute
            }
            _ => {
                tracing::debug!(user = %user, "Basic authentication rejected");
                self.challenge(ctx)
            }
        }
    }

    fn is_authentication(&self) -> bool {
        true
    }
}

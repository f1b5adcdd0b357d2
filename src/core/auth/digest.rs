//! Digest authentication behavior (RFC 2617 semantics).
//!
//! Server nonces are self-validating: a millisecond timestamp plus an
//! HMAC-SHA256 signature over the timestamp, client IP, and server port,
//! keyed with a per-process random secret. Validation distinguishes three
//! terminal states: valid, stale (authentic but past the configured
//! lifetime, re-challenged with `stale=true` so clients retry without
//! re-prompting), and invalid (re-challenged plainly).

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use http::StatusCode;
use md5::{Digest as _, Md5};

use crate::{
    config::{DigestOptions, QopMode, ValidationError},
    core::{auth::hmac::HashAlgorithm, context::MethodContext},
    ports::{BehaviorResult, CredentialSource, SecureServiceBehavior, ServiceBehavior},
};

/// Outcome of server-nonce validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NonceState {
    Valid,
    /// Authentic but older than the configured lifetime.
    Stale,
    Invalid,
}

/// Validates `Authorization: Digest` credentials, issuing challenges with
/// fresh nonces on every rejection.
pub struct DigestAuthBehavior {
    realm: String,
    qop: QopMode,
    nonce_lifetime: Duration,
    key: [u8; 32],
    credentials: Arc<dyn CredentialSource>,
}

impl DigestAuthBehavior {
    /// Build from configured digest options with a fresh per-process key.
    pub fn from_config(
        options: &DigestOptions,
        credentials: Arc<dyn CredentialSource>,
    ) -> Result<Self, ValidationError> {
        let nonce_lifetime = humantime::parse_duration(&options.nonce_lifetime).map_err(|e| {
            ValidationError::InvalidDuration {
                field: "digest.nonce_lifetime".to_string(),
                message: format!("'{}': {e}", options.nonce_lifetime),
            }
        })?;

        Ok(Self {
            realm: options.realm.clone(),
            qop: options.qop,
            nonce_lifetime,
            key: rand::random(),
            credentials,
        })
    }

    fn now_millis() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default()
    }

    fn nonce_signature(&self, timestamp: u64, client_ip: &str, server_port: u16) -> String {
        let payload = format!("{timestamp:x}:{client_ip}:{server_port}");
        hex::encode(HashAlgorithm::Sha256.sign(&self.key, payload.as_bytes()))
    }

    /// Mint a nonce bound to the requesting client and this server.
    pub(crate) fn create_nonce(&self, client_ip: &str, server_port: u16) -> String {
        let timestamp = Self::now_millis();
        let signature = self.nonce_signature(timestamp, client_ip, server_port);
        BASE64.encode(format!("{timestamp:x}:{signature}"))
    }

    pub(crate) fn classify_nonce(
        &self,
        nonce: &str,
        client_ip: &str,
        server_port: u16,
    ) -> NonceState {
        let Ok(decoded) = BASE64.decode(nonce) else {
            return NonceState::Invalid;
        };
        let Ok(decoded) = String::from_utf8(decoded) else {
            return NonceState::Invalid;
        };
        let Some((timestamp_hex, signature)) = decoded.split_once(':') else {
            return NonceState::Invalid;
        };
        let Ok(timestamp) = u64::from_str_radix(timestamp_hex, 16) else {
            return NonceState::Invalid;
        };

        if self.nonce_signature(timestamp, client_ip, server_port) != signature {
            return NonceState::Invalid;
        }

        let age = Self::now_millis().saturating_sub(timestamp);
        if age > self.nonce_lifetime.as_millis() as u64 {
            NonceState::Stale
        } else {
            NonceState::Valid
        }
    }

    /// Split a `Digest k="v", k2=v2, ...` header into its parameters.
    fn parse_authorization(header: &str) -> Option<HashMap<String, String>> {
        let params = header.strip_prefix("Digest ").or_else(|| header.strip_prefix("digest "))?;

        let mut fields = HashMap::new();
        let mut rest = params.trim();
        while !rest.is_empty() {
            let (key, tail) = rest.split_once('=')?;
            let key = key.trim().to_ascii_lowercase();
            let tail = tail.trim_start();

            let (value, remaining) = if let Some(tail) = tail.strip_prefix('"') {
                let end = tail.find('"')?;
                (tail[..end].to_string(), &tail[end + 1..])
            } else {
                match tail.find(',') {
                    Some(end) => (tail[..end].trim().to_string(), &tail[end..]),
                    None => (tail.trim().to_string(), ""),
                }
            };

            fields.insert(key, value);
            rest = remaining.trim_start().strip_prefix(',').unwrap_or(remaining).trim_start();
        }
        Some(fields)
    }

    fn expected_response(
        &self,
        ha1: &str,
        method: &str,
        uri: &str,
        nonce: &str,
        qop_fields: Option<(&str, &str)>,
    ) -> String {
        let ha2 = md5_hex(&format!("{method}:{uri}"));
        match qop_fields {
            Some((nc, cnonce)) => md5_hex(&format!("{ha1}:{nonce}:{nc}:{cnonce}:auth:{ha2}")),
            None => md5_hex(&format!("{ha1}:{nonce}:{ha2}")),
        }
    }

    fn challenge(&self, ctx: &mut MethodContext, stale: bool) -> BehaviorResult {
        let client_ip = ctx
            .request()
            .remote_ip()
            .map(|ip| ip.to_string())
            .unwrap_or_default();
        let nonce = self.create_nonce(&client_ip, ctx.request().server_port());

        let mut value = format!("Digest realm=\"{}\", nonce=\"{nonce}\"", self.realm);
        if self.qop == QopMode::Auth {
            value.push_str(", qop=\"auth\"");
        }
        if stale {
            value.push_str(", stale=true");
        }

        ctx.response.set_status(StatusCode::UNAUTHORIZED);
        ctx.response.set_header("www-authenticate", &value);
        BehaviorResult::stop(StatusCode::UNAUTHORIZED, "Unauthorized")
    }
}

fn md5_hex(input: &str) -> String {
    hex::encode(Md5::digest(input.as_bytes()))
}

#[async_trait]
impl ServiceBehavior for DigestAuthBehavior {
    fn as_secure(&self) -> Option<&dyn SecureServiceBehavior> {
        Some(self)
    }
}

#[async_trait]
impl SecureServiceBehavior for DigestAuthBehavior {
    async fn on_authorizing(&self, ctx: &mut MethodContext) -> BehaviorResult {
        let Some(fields) = ctx
            .request()
            .header("authorization")
            .and_then(Self::parse_authorization)
        else {
            return self.challenge(ctx, false);
        };

        let (Some(user), Some(nonce), Some(uri), Some(response)) = (
            fields.get("username"),
            fields.get("nonce"),
            fields.get("uri"),
            fields.get("response"),
        ) else {
            return self.challenge(ctx, false);
        };

        // The signed URI must be the one actually requested.
        let request = ctx.request();
        if uri != request.path()
            && Some(uri.as_str())
                != request.uri().path_and_query().map(|pq| pq.as_str())
        {
            return self.challenge(ctx, false);
        }

        let client_ip = request
            .remote_ip()
            .map(|ip| ip.to_string())
            .unwrap_or_default();
        match self.classify_nonce(nonce, &client_ip, request.server_port()) {
            NonceState::Valid => {}
            NonceState::Stale => return self.challenge(ctx, true),
            NonceState::Invalid => return self.challenge(ctx, false),
        }

        let qop_fields = match self.qop {
            QopMode::Auth => {
                let (Some(qop), Some(nc), Some(cnonce)) =
                    (fields.get("qop"), fields.get("nc"), fields.get("cnonce"))
                else {
                    return self.challenge(ctx, false);
                };
                if !qop.eq_ignore_ascii_case("auth") {
                    return self.challenge(ctx, false);
                }
                Some((nc.as_str(), cnonce.as_str()))
            }
            QopMode::None => None,
        };

        let Some(stored) = self.credentials.find(user).await else {
            tracing::debug!(user = %user, "Digest authentication for unknown user");
            return self.challenge(ctx, false);
        };

        let ha1 = stored
            .ha1
            .clone()
            .unwrap_or_else(|| md5_hex(&format!("{}:{}:{}", user, self.realm, stored.password)));

        let method = ctx.request().method().as_str().to_string();
        let expected = self.expected_response(&ha1, &method, uri, nonce, qop_fields);
        if expected.eq_ignore_ascii_case(response) {
            let user = user.clone();
            ctx.set_principal(user);
            BehaviorResult::Execute
        } else {
            tracing::debug!(user = %user, "Digest response hash mismatch");
            self.challenge(ctx, false)
        }
    }

    fn is_authentication(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use http::Method;

    use super::*;
    use crate::{
        core::{context::ServiceRequest, router::RouteDescriptor},
        ports::MemoryCredentialSource,
    };

    const CLIENT_IP: &str = "10.0.0.7";
    const PORT: u16 = 8080;

    fn behavior(lifetime: &str, qop: QopMode) -> DigestAuthBehavior {
        DigestAuthBehavior::from_config(
            &DigestOptions {
                realm: "api".to_string(),
                nonce_lifetime: lifetime.to_string(),
                qop,
            },
            Arc::new(MemoryCredentialSource::new().with_user("ann", "s3cret")),
        )
        .unwrap()
    }

    fn ctx(authorization: Option<&str>) -> MethodContext {
        let mut builder = ServiceRequest::builder(Method::GET, "/ledger".parse().unwrap())
            .remote_addr(format!("{CLIENT_IP}:40000").parse().unwrap())
            .server_port(PORT);
        if let Some(value) = authorization {
            builder = builder.header("Authorization", value);
        }
        MethodContext::new(
            Arc::new(builder.build()),
            Arc::new(RouteDescriptor::new(Method::GET, "/ledger")),
        )
    }

    fn client_response(nonce: &str, user: &str, password: &str, qop: bool) -> String {
        let ha1 = md5_hex(&format!("{user}:api:{password}"));
        let ha2 = md5_hex("GET:/ledger");
        let response = if qop {
            md5_hex(&format!("{ha1}:{nonce}:00000001:abcdef:auth:{ha2}"))
        } else {
            md5_hex(&format!("{ha1}:{nonce}:{ha2}"))
        };
        if qop {
            format!(
                "Digest username=\"{user}\", realm=\"api\", nonce=\"{nonce}\", uri=\"/ledger\", \
                 qop=auth, nc=00000001, cnonce=\"abcdef\", response=\"{response}\""
            )
        } else {
            format!(
                "Digest username=\"{user}\", realm=\"api\", nonce=\"{nonce}\", uri=\"/ledger\", \
                 response=\"{response}\""
            )
        }
    }

    #[test]
    fn test_nonce_round_trip() {
        let behavior = behavior("2m", QopMode::Auth);
        let nonce = behavior.create_nonce(CLIENT_IP, PORT);
        assert_eq!(
            behavior.classify_nonce(&nonce, CLIENT_IP, PORT),
            NonceState::Valid
        );
    }

    #[test]
    fn test_nonce_bound_to_client_and_port() {
        let behavior = behavior("2m", QopMode::Auth);
        let nonce = behavior.create_nonce(CLIENT_IP, PORT);
        assert_eq!(
            behavior.classify_nonce(&nonce, "10.0.0.8", PORT),
            NonceState::Invalid
        );
        assert_eq!(
            behavior.classify_nonce(&nonce, CLIENT_IP, 9090),
            NonceState::Invalid
        );
    }

    #[test]
    fn test_expired_nonce_is_stale_not_invalid() {
        let behavior = behavior("30ms", QopMode::Auth);
        let nonce = behavior.create_nonce(CLIENT_IP, PORT);
        std::thread::sleep(Duration::from_millis(80));
        assert_eq!(
            behavior.classify_nonce(&nonce, CLIENT_IP, PORT),
            NonceState::Stale
        );
    }

    #[test]
    fn test_tampered_nonce_is_invalid() {
        let behavior = behavior("2m", QopMode::Auth);
        let nonce = behavior.create_nonce(CLIENT_IP, PORT);
        let mut tampered = nonce.into_bytes();
        tampered[4] = if tampered[4] == b'A' { b'B' } else { b'A' };
        let tampered = String::from_utf8(tampered).unwrap();
        assert_eq!(
            behavior.classify_nonce(&tampered, CLIENT_IP, PORT),
            NonceState::Invalid
        );
    }

    #[tokio::test]
    async fn test_missing_header_challenges_with_qop() {
        let behavior = behavior("2m", QopMode::Auth);
        let mut ctx = ctx(None);
        assert!(matches!(
            behavior.on_authorizing(&mut ctx).await,
            BehaviorResult::Stop {
                status: StatusCode::UNAUTHORIZED,
                ..
            }
        ));
        let challenge = ctx
            .response
            .headers()
            .get("www-authenticate")
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(challenge.starts_with("Digest realm=\"api\""));
        assert!(challenge.contains("qop=\"auth\""));
        assert!(!challenge.contains("stale=true"));
        assert_eq!(ctx.response.status(), Some(StatusCode::UNAUTHORIZED));
    }

    #[tokio::test]
    async fn test_valid_qop_auth_flow() {
        let behavior = behavior("2m", QopMode::Auth);
        let nonce = behavior.create_nonce(CLIENT_IP, PORT);
        let mut ctx = ctx(Some(&client_response(&nonce, "ann", "s3cret", true)));
        assert_eq!(
            behavior.on_authorizing(&mut ctx).await,
            BehaviorResult::Execute
        );
        assert_eq!(ctx.principal(), Some("ann"));
    }

    #[tokio::test]
    async fn test_valid_legacy_flow_without_qop() {
        let behavior = behavior("2m", QopMode::None);
        let nonce = behavior.create_nonce(CLIENT_IP, PORT);
        let mut ctx = ctx(Some(&client_response(&nonce, "ann", "s3cret", false)));
        assert_eq!(
            behavior.on_authorizing(&mut ctx).await,
            BehaviorResult::Execute
        );
    }

    #[tokio::test]
    async fn test_wrong_password_rechallenges_without_stale() {
        let behavior = behavior("2m", QopMode::Auth);
        let nonce = behavior.create_nonce(CLIENT_IP, PORT);
        let mut ctx = ctx(Some(&client_response(&nonce, "ann", "wrong", true)));
        assert!(matches!(
            behavior.on_authorizing(&mut ctx).await,
            BehaviorResult::Stop { .. }
        ));
        let challenge = ctx
            .response
            .headers()
            .get("www-authenticate")
            .unwrap()
            .to_str()
            .unwrap();
        assert!(!challenge.contains("stale=true"));
    }

    #[tokio::test]
    async fn test_stale_nonce_rechallenges_with_stale_flag() {
        let behavior = behavior("30ms", QopMode::Auth);
        let nonce = behavior.create_nonce(CLIENT_IP, PORT);
        std::thread::sleep(Duration::from_millis(80));
        let mut ctx = ctx(Some(&client_response(&nonce, "ann", "s3cret", true)));
        assert!(matches!(
            behavior.on_authorizing(&mut ctx).await,
            BehaviorResult::Stop { .. }
        ));
        let challenge = ctx
            .response
            .headers()
            .get("www-authenticate")
            .unwrap()
            .to_str()
            .unwrap();
        assert!(challenge.contains("stale=true"));
    }

    #[test]
    fn test_parse_authorization_handles_quotes_and_bare_values() {
        let fields = DigestAuthBehavior::parse_authorization(
            "Digest username=\"ann\", qop=auth, nc=00000001, uri=\"/a, b\"",
        )
        .unwrap();
        assert_eq!(fields.get("username").unwrap(), "ann");
        assert_eq!(fields.get("qop").unwrap(), "auth");
        assert_eq!(fields.get("nc").unwrap(), "00000001");
        assert_eq!(fields.get("uri").unwrap(), "/a, b");
    }
}

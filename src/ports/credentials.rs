//! Credential store port used by the Basic and Digest behaviors.

use std::collections::HashMap;

use async_trait::async_trait;

/// Credentials held by the store for one user.
///
/// Digest authentication needs the cleartext password to derive `HA1`;
/// stores that only hold a precomputed `MD5(user:realm:password)` can supply
/// it via `ha1` instead.
#[derive(Debug, Clone)]
pub struct StoredCredentials {
    pub user: String,
    pub password: String,
    pub ha1: Option<String>,
}

impl StoredCredentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
            ha1: None,
        }
    }
}

/// Looks up credentials for a user name.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn find(&self, user: &str) -> Option<StoredCredentials>;
}

/// Fixed in-memory credential store; read-only after construction, so it is
/// shared across requests without locking.
#[derive(Debug, Default)]
pub struct MemoryCredentialSource {
    users: HashMap<String, StoredCredentials>,
}

impl MemoryCredentialSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        let credentials = StoredCredentials::new(user, password);
        self.users.insert(credentials.user.clone(), credentials);
        self
    }
}

#[async_trait]
impl CredentialSource for MemoryCredentialSource {
    async fn find(&self, user: &str) -> Option<StoredCredentials> {
        self.users.get(user).cloned()
    }
}

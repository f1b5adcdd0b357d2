//! In-process output cache with per-hit authorization revalidation.
//!
//! Entries capture the buffered response plus every secure behavior that
//! authorized the original request. A hit is only served after each captured
//! behavior authorizes the *current* request again; a failed revalidation
//! evicts the entry, so caching can never bypass a security check.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};

use crate::ports::ServiceBehavior;

/// One cached response and its revalidation set.
#[derive(Clone)]
pub(crate) struct CacheEntry {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    expires_at: Instant,
    pub validators: Vec<Arc<dyn ServiceBehavior>>,
}

impl CacheEntry {
    pub fn new(
        status: StatusCode,
        headers: HeaderMap,
        body: Bytes,
        lifetime: Duration,
        validators: Vec<Arc<dyn ServiceBehavior>>,
    ) -> Self {
        Self {
            status,
            headers,
            body,
            expires_at: Instant::now() + lifetime,
            validators,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Concurrent response cache keyed by method + path (+ query).
pub(crate) struct OutputCache {
    entries: scc::HashMap<String, CacheEntry>,
}

impl OutputCache {
    pub fn new() -> Self {
        Self {
            entries: scc::HashMap::new(),
        }
    }

    pub fn key(method: &Method, path: &str, query: Option<&str>, vary_query: bool) -> String {
        match query {
            Some(query) if vary_query => format!("{method} {path}?{query}"),
            _ => format!("{method} {path}"),
        }
    }

    /// Fetch a live entry; expired entries are evicted on the way.
    pub async fn lookup(&self, key: &str) -> Option<CacheEntry> {
        let entry = self
            .entries
            .get_async(&key.to_string())
            .await
            .map(|entry| entry.get().clone())?;
        if entry.is_expired() {
            self.evict(key).await;
            return None;
        }
        Some(entry)
    }

    pub async fn store(&self, key: String, entry: CacheEntry) {
        // Upsert: the newest response wins.
        let _ = self.entries.remove_async(&key).await;
        let _ = self.entries.insert_async(key, entry).await;
    }

    pub async fn evict(&self, key: &str) {
        let _ = self.entries.remove_async(&key.to_string()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(lifetime: Duration) -> CacheEntry {
        CacheEntry::new(
            StatusCode::OK,
            HeaderMap::new(),
            Bytes::from_static(b"cached"),
            lifetime,
            Vec::new(),
        )
    }

    #[test]
    fn test_key_varies_on_query_when_asked() {
        let with = OutputCache::key(&Method::GET, "/a", Some("q=1"), true);
        let without = OutputCache::key(&Method::GET, "/a", Some("q=1"), false);
        assert_ne!(with, without);
        assert_eq!(without, OutputCache::key(&Method::GET, "/a", None, true));
    }

    #[tokio::test]
    async fn test_store_and_lookup() {
        let cache = OutputCache::new();
        cache
            .store("GET /a".to_string(), entry(Duration::from_secs(30)))
            .await;
        let hit = cache.lookup("GET /a").await.expect("live entry");
        assert_eq!(hit.body.as_ref(), b"cached");
    }

    #[tokio::test]
    async fn test_expired_entry_is_evicted() {
        let cache = OutputCache::new();
        cache
            .store("GET /a".to_string(), entry(Duration::from_millis(10)))
            .await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(cache.lookup("GET /a").await.is_none());
        // A second lookup still misses: the entry is gone, not just stale.
        assert!(cache.lookup("GET /a").await.is_none());
    }

    #[tokio::test]
    async fn test_store_replaces_existing() {
        let cache = OutputCache::new();
        cache
            .store("GET /a".to_string(), entry(Duration::from_secs(30)))
            .await;
        let mut replacement = entry(Duration::from_secs(30));
        replacement.body = Bytes::from_static(b"fresh");
        cache.store("GET /a".to_string(), replacement).await;
        let hit = cache.lookup("GET /a").await.expect("live entry");
        assert_eq!(hit.body.as_ref(), b"fresh");
    }
}

//! Short-lived in-memory cache for read paths.
//!
//! Entries expire after a fixed TTL and are never invalidated otherwise. Only
//! successful read responses go in.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::time::Instant;

use crate::credentials::Credentials;

struct Entry {
    stored_at: Instant,
    value: Value,
}

pub struct ReadCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

impl ReadCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    /// Key scoped to the resolved identity. The token only enters as a digest.
    pub fn key(creds: &Credentials, operation: &str, params: &str) -> String {
        let digest = Sha256::digest(creds.personal_access_token.as_bytes());
        format!(
            "{}|{}|{}|{operation}|{params}",
            creds.organization_url,
            creds.project.as_deref().unwrap_or_default(),
            hex::encode(&digest[..8]),
        )
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if !self.is_enabled() {
            return None;
        }
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let fresh = entries
            .get(key)
            .map(|e| e.stored_at.elapsed() < self.ttl)
            .unwrap_or(false);
        if !fresh {
            entries.remove(key);
            return None;
        }
        entries
            .get(key)
            .and_then(|e| serde_json::from_value(e.value.clone()).ok())
    }

    pub fn put<T: Serialize>(&self, key: String, value: &T) {
        if !self.is_enabled() {
            return;
        }
        let Ok(value) = serde_json::to_value(value) else {
            return;
        };
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let ttl = self.ttl;
        entries.retain(|_, e| e.stored_at.elapsed() < ttl);
        entries.insert(
            key,
            Entry {
                stored_at: Instant::now(),
                value,
            },
        );
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds(pat: &str) -> Credentials {
        Credentials::new("https://dev.azure.com/o", pat, Some("P"))
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = ReadCache::new(Duration::from_secs(60));
        let key = ReadCache::key(&creds("a"), "stories", "top=50");
        cache.put(key.clone(), &vec![1, 2, 3]);

        assert_eq!(cache.get::<Vec<i64>>(&key), Some(vec![1, 2, 3]));
        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(cache.get::<Vec<i64>>(&key), None);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn keys_differ_per_token_and_hide_it() {
        let a = ReadCache::key(&creds("token-a"), "stories", "");
        let b = ReadCache::key(&creds("token-b"), "stories", "");
        assert_ne!(a, b);
        assert!(!a.contains("token-a"));
    }

    #[tokio::test]
    async fn zero_ttl_disables_caching() {
        let cache = ReadCache::new(Duration::ZERO);
        cache.put("k".into(), &1);
        assert_eq!(cache.get::<i32>("k"), None);
        assert_eq!(cache.len(), 0);
    }
}

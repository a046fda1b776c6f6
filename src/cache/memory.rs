//! In-process cache.
//!
//! Suitable when every caller of the queue lives in one process; use
//! [`FileCache`](super::FileCache) to share the debounce token between
//! processes.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::{Cache, CacheError, expiry_from_now};

#[derive(Debug, Clone)]
struct Entry {
    value: serde_json::Value,
    expires_at: DateTime<Utc>,
}

/// A map of key to value with expiry timestamps.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value stored under `key`, if it has not expired.
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .get(key)
            .filter(|entry| entry.expires_at > Utc::now())
            .map(|entry| entry.value.clone())
    }

    /// Drops expired entries and returns how many were removed.
    pub fn prune_expired(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    /// Number of stored entries, expired or not.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Cache for MemoryCache {
    fn contains(&self, key: &str) -> Result<bool, CacheError> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries
            .get(key)
            .is_some_and(|entry| entry.expires_at > Utc::now()))
    }

    fn save(&self, key: &str, value: serde_json::Value, ttl: Duration) -> Result<(), CacheError> {
        let expires_at = expiry_from_now(ttl)?;
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }
}

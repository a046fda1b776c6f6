//! Key/value cache with per-key time-to-live, and the debounce lock built on it.
//!
//! The queue only needs two operations from a cache: "is this key live?" and
//! "store this key for N seconds". Keys are never explicitly deleted; an
//! expired key is indistinguishable from an absent one.

pub mod debounce;
pub mod file;
pub mod memory;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

pub use debounce::{DebounceLock, LockState};
pub use file::FileCache;
pub use memory::MemoryCache;

/// Errors that can occur while talking to a cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// IO error in a file-backed cache.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error writing an entry.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The TTL does not fit in a timestamp.
    #[error("TTL out of range: {0:?}")]
    TtlOutOfRange(Duration),
}

/// A TTL-aware key/value cache.
pub trait Cache {
    /// Returns whether `key` is present and unexpired.
    fn contains(&self, key: &str) -> Result<bool, CacheError>;

    /// Stores `value` under `key`, expiring after `ttl`.
    fn save(&self, key: &str, value: serde_json::Value, ttl: Duration) -> Result<(), CacheError>;
}

impl<C: Cache + ?Sized> Cache for &C {
    fn contains(&self, key: &str) -> Result<bool, CacheError> {
        (**self).contains(key)
    }

    fn save(&self, key: &str, value: serde_json::Value, ttl: Duration) -> Result<(), CacheError> {
        (**self).save(key, value, ttl)
    }
}

impl<C: Cache + ?Sized> Cache for Arc<C> {
    fn contains(&self, key: &str) -> Result<bool, CacheError> {
        (**self).contains(key)
    }

    fn save(&self, key: &str, value: serde_json::Value, ttl: Duration) -> Result<(), CacheError> {
        (**self).save(key, value, ttl)
    }
}

/// Computes the expiry instant for a TTL starting now.
pub(crate) fn expiry_from_now(
    ttl: Duration,
) -> Result<chrono::DateTime<chrono::Utc>, CacheError> {
    let delta = chrono::Duration::from_std(ttl).map_err(|_| CacheError::TtlOutOfRange(ttl))?;
    chrono::Utc::now()
        .checked_add_signed(delta)
        .ok_or(CacheError::TtlOutOfRange(ttl))
}

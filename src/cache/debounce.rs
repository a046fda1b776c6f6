//! TTL-based debounce lock.
//!
//! Bounds how often an expensive operation runs rather than providing strict
//! mutual exclusion: the lock is never released, it simply expires. Two
//! callers can both acquire it only if they interleave between the
//! containment check and the save.

use std::time::Duration;

use tracing::debug;

use super::{Cache, CacheError};

/// Outcome of an acquisition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    /// The token was absent and has now been stored; proceed.
    Acquired,

    /// The token is live; skip the operation.
    AlreadyHeld,
}

impl LockState {
    pub fn is_acquired(self) -> bool {
        matches!(self, LockState::Acquired)
    }
}

/// A named debounce token in a cache.
#[derive(Debug, Clone, Copy)]
pub struct DebounceLock<'a, C: ?Sized> {
    cache: &'a C,
    key: &'a str,
    ttl: Duration,
}

impl<'a, C: Cache + ?Sized> DebounceLock<'a, C> {
    pub fn new(cache: &'a C, key: &'a str, ttl: Duration) -> Self {
        DebounceLock { cache, key, ttl }
    }

    /// Stores the token unless it is already live.
    pub fn try_acquire(&self) -> Result<LockState, CacheError> {
        try_acquire(self.cache, self.key, self.ttl)
    }
}

/// Stores `key` with `ttl` in `cache` unless it is already live.
pub fn try_acquire<C: Cache + ?Sized>(
    cache: &C,
    key: &str,
    ttl: Duration,
) -> Result<LockState, CacheError> {
    if cache.contains(key)? {
        debug!(key, "debounce token held");
        return Ok(LockState::AlreadyHeld);
    }

    cache.save(key, serde_json::Value::Bool(true), ttl)?;
    debug!(key, ttl_secs = ttl.as_secs(), "debounce token acquired");
    Ok(LockState::Acquired)
}

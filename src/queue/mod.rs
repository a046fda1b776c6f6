//! The two queue entry points: flushing the live transport's spool, and
//! recovering messages from the durable spool store.
//!
//! Both are invoked synchronously by an external trigger (end of a request, a
//! scheduled tick). Neither keeps state between calls: the debounce token
//! lives in the cache and the messages live on disk.
//!
//! # Retry run
//!
//! ```text
//! guard      try_acquire(lock_key, lock_ttl)   AlreadyHeld -> empty report
//! exists     .spool/ present?                  no          -> empty report
//! enumerate  *.message, sorted
//! per entry  claim -> read -> decode -> send -> delete (or release)
//! ```
//!
//! A failure confined to one entry (claim race, IO error, corrupt payload, a
//! rejection by the server) is logged and the entry skipped; the rest of the
//! batch still runs, and only entries the transport accepted count toward
//! `max_batch`. A connection failure ends the run: the claimed entry is
//! released and the error returned.

mod flush;
mod retry;


use thiserror::Error;

use crate::cache::CacheError;
use crate::config::SpoolConfig;
use crate::spool::{SpoolError, SpoolStore};
use crate::transport::{SpoolTransport, TransportError};
use crate::types::{Address, MessageId};

/// How a flush treats transport errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushPolicy {
    /// Log and discard errors. For flushes after the response has been sent,
    /// where nobody is left to handle a failure.
    BestEffort,

    /// Return errors to the caller.
    Strict,
}

/// Why a retry run did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another run happened within the debounce window.
    LockHeld,

    /// The spool directory does not exist.
    NoSpool,
}

/// Outcome of one retry run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryReport {
    /// Set when the run returned before enumerating.
    pub skipped_run: Option<SkipReason>,

    /// Recipients refused across every message sent in this run.
    pub failed_recipients: Vec<Address>,

    /// Messages sent and removed from the spool.
    pub delivered: usize,

    /// Messages sent with refused recipients and returned to pending.
    pub requeued: usize,

    /// Entries left pending: lost a claim race, could not be read or decoded,
    /// or were rejected by the server.
    pub skipped: usize,
}

impl RetryReport {
    fn not_run(reason: SkipReason) -> Self {
        RetryReport {
            skipped_run: Some(reason),
            ..Self::default()
        }
    }

    /// Whether enumeration ran at all.
    pub fn ran(&self) -> bool {
        self.skipped_run.is_none()
    }

    pub fn into_failed_recipients(self) -> Vec<Address> {
        self.failed_recipients
    }
}

/// Errors that end a retry run.
#[derive(Debug, Error)]
pub enum RetryError {
    /// The debounce cache could not be consulted.
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// The spool directory could not be enumerated.
    #[error("spool error: {0}")]
    Spool(#[from] SpoolError),

    /// The transport could not deliver at all; the message was returned to
    /// pending.
    #[error("transport error delivering {id}: {source}")]
    Transport {
        id: MessageId,
        #[source]
        source: TransportError,
    },
}

/// Flushes the live transport's spool and retries the durable spool store.
///
/// - `S`: the live transport's internal spool
/// - `T`: the real transport messages are delivered through
/// - `K`: the cache holding the debounce token
/// - `C`: the codec for payloads in the spool store
#[derive(Debug)]
pub struct QueueProcessor<S, T, K, C> {
    live: SpoolTransport<S>,
    transport: T,
    cache: K,
    codec: C,
    store: SpoolStore,
    config: SpoolConfig,
}

impl<S, T, K, C> QueueProcessor<S, T, K, C> {
    pub fn new(config: SpoolConfig, live: SpoolTransport<S>, transport: T, cache: K, codec: C) -> Self {
        QueueProcessor {
            store: SpoolStore::new(&config.cache_root),
            live,
            transport,
            cache,
            codec,
            config,
        }
    }

    pub fn store(&self) -> &SpoolStore {
        &self.store
    }

    pub fn live_transport(&self) -> &SpoolTransport<S> {
        &self.live
    }
}

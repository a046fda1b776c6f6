//! Durable spool of messages awaiting redelivery.
//!
//! Each message is one file in a reserved `.spool/` directory under the cache
//! root. Ownership of a message moves from the store to a retry run by an
//! atomic rename:
//!
//! ```text
//! <id>.message             - pending
//! <id>.message.processing  - claimed by exactly one run
//! ```
//!
//! # Crash Safety
//!
//! - Payloads are written to a temp name, synced, then renamed into place
//! - Every rename and removal is followed by a directory fsync
//! - A run that dies after claiming leaves a `.processing` file behind; it is
//!   neither lost nor picked up by another run until
//!   [`SpoolStore::recover_stale`] returns it to pending

pub mod fsync;
pub mod message;
pub mod store;

pub use message::{
    ClaimedMessage, MESSAGE_EXTENSION, PROCESSING_SUFFIX, Result, SpoolError, SpooledMessage,
};
pub use store::{PendingMessages, SPOOL_DIR_NAME, SpoolStore};

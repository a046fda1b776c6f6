//! Mail Spool - a durable, disk-backed outbound mail queue with deferred
//! delivery and debounced recovery.
//!
//! Messages that could not be sent are kept as one file each in a `.spool/`
//! directory. [`QueueProcessor::flush`](queue::QueueProcessor::flush) drains
//! the live transport's own queue; [`QueueProcessor::retry`](queue::QueueProcessor::retry)
//! redelivers what is left in the spool store, at most once per debounce window.

pub mod cache;
pub mod codec;
pub mod config;
pub mod queue;
pub mod spool;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod test_utils;

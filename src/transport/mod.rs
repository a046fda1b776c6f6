//! Mail transport capabilities.
//!
//! A [`Transport`] delivers one message and reports which recipients were
//! refused. A [`Spool`] is a transport-internal queue that holds messages
//! until it is flushed into a real transport. [`SpoolTransport`] is the live
//! transport an application sends through: it accepts messages by queueing
//! them, and exposes the spool so a flush can drain it later.

pub mod memory;

use std::sync::Arc;

use thiserror::Error;

use crate::types::Address;

pub use memory::MemorySpool;

/// Errors raised by a transport while delivering.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The transport could not reach the mail server.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The server refused the message as a whole.
    #[error("message rejected: {0}")]
    Rejected(String),
}

impl TransportError {
    /// Whether the failure belongs to the message rather than the transport.
    ///
    /// A rejected message says nothing about the next one; a dead connection
    /// fails every message after it.
    pub fn is_message_scoped(&self) -> bool {
        matches!(self, TransportError::Rejected(_))
    }
}

/// Result of sending one message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendReport {
    /// Recipients the server refused. Empty when every recipient was accepted.
    pub failed_recipients: Vec<Address>,
}

impl SendReport {
    /// Every recipient accepted.
    pub fn delivered() -> Self {
        Self::default()
    }

    /// Some recipients refused.
    pub fn with_failures(failed_recipients: impl IntoIterator<Item = Address>) -> Self {
        SendReport {
            failed_recipients: failed_recipients.into_iter().collect(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.failed_recipients.is_empty()
    }
}

/// Result of draining a spool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Messages handed to the transport.
    pub sent: usize,

    /// Recipients refused across all sent messages.
    pub failed_recipients: Vec<Address>,
}

/// Delivers messages of type `M`.
pub trait Transport<M: ?Sized> {
    /// Sends `message`, returning the refused recipients.
    ///
    /// # Errors
    ///
    /// Returns a `TransportError` when the message as a whole could not be
    /// handed over.
    fn send(&self, message: &M) -> Result<SendReport, TransportError>;
}

impl<M: ?Sized, T: Transport<M> + ?Sized> Transport<M> for &T {
    fn send(&self, message: &M) -> Result<SendReport, TransportError> {
        (**self).send(message)
    }
}

impl<M: ?Sized, T: Transport<M> + ?Sized> Transport<M> for Arc<T> {
    fn send(&self, message: &M) -> Result<SendReport, TransportError> {
        (**self).send(message)
    }
}

/// A transport-internal queue of messages awaiting a flush.
pub trait Spool<M> {
    /// Adds a message to the queue.
    fn queue_message(&self, message: M) -> Result<(), TransportError>;

    /// Sends every queued message through `transport`.
    ///
    /// # Errors
    ///
    /// Stops at the first `TransportError`; messages not yet sent, including
    /// the one that failed, remain queued.
    fn flush_queue(&self, transport: &dyn Transport<M>) -> Result<FlushReport, TransportError>;
}

/// The live transport: "sending" queues the message on its spool.
#[derive(Debug, Default)]
pub struct SpoolTransport<S> {
    spool: S,
}

impl<S> SpoolTransport<S> {
    pub fn new(spool: S) -> Self {
        SpoolTransport { spool }
    }

    pub fn spool(&self) -> &S {
        &self.spool
    }
}

impl<M: Clone, S: Spool<M>> Transport<M> for SpoolTransport<S> {
    fn send(&self, message: &M) -> Result<SendReport, TransportError> {
        self.spool.queue_message(message.clone())?;
        Ok(SendReport::delivered())
    }
}

//! Shared test doubles and generators.

use std::collections::HashSet;
use std::sync::Mutex;

use proptest::prelude::*;

use crate::transport::{SendReport, Transport, TransportError};
use crate::types::{Address, Message};

/// A transport that records every message it is given.
///
/// Recipients registered with [`refusing`](Self::refusing) are reported as
/// failed; messages whose subject was registered with
/// [`erroring_on`](Self::erroring_on) raise a connection error, and those
/// registered with [`rejecting`](Self::rejecting) are rejected outright.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Message>>,
    refused: HashSet<Address>,
    erroring_subjects: HashSet<String>,
    rejected_subjects: HashSet<String>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refusing(mut self, addr: impl Into<Address>) -> Self {
        self.refused.insert(addr.into());
        self
    }

    pub fn erroring_on(mut self, subject: impl Into<String>) -> Self {
        self.erroring_subjects.insert(subject.into());
        self
    }

    pub fn rejecting(mut self, subject: impl Into<String>) -> Self {
        self.rejected_subjects.insert(subject.into());
        self
    }

    pub fn sent(&self) -> Vec<Message> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_subjects(&self) -> Vec<String> {
        self.sent().into_iter().map(|m| m.subject).collect()
    }
}

impl Transport<Message> for RecordingTransport {
    fn send(&self, message: &Message) -> Result<SendReport, TransportError> {
        if self.erroring_subjects.contains(&message.subject) {
            return Err(TransportError::Connection(format!(
                "refusing to send {:?}",
                message.subject
            )));
        }
        if self.rejected_subjects.contains(&message.subject) {
            return Err(TransportError::Rejected(format!(
                "550 {:?} refused by policy",
                message.subject
            )));
        }

        self.sent.lock().unwrap().push(message.clone());
        Ok(SendReport::with_failures(
            message
                .recipients()
                .filter(|r| self.refused.contains(*r))
                .cloned(),
        ))
    }
}

/// A transport that fails every send.
#[derive(Debug)]
pub struct FailingTransport {
    reason: String,
}

impl FailingTransport {
    pub fn connection(reason: impl Into<String>) -> Self {
        FailingTransport {
            reason: reason.into(),
        }
    }
}

impl<M: ?Sized> Transport<M> for FailingTransport {
    fn send(&self, _message: &M) -> Result<SendReport, TransportError> {
        Err(TransportError::Connection(self.reason.clone()))
    }
}

/// A message to a single recipient.
pub fn message_to(subject: &str, recipient: &str) -> Message {
    Message::new("noreply@example.com", subject, "body").to(recipient)
}

pub fn arb_address() -> impl Strategy<Value = Address> {
    "[a-z]{1,8}@example\\.com".prop_map(Address::new)
}

pub fn arb_message() -> impl Strategy<Value = Message> {
    (
        "[a-z ]{0,20}",
        "[a-zA-Z0-9 ]{0,100}",
        prop::collection::vec(arb_address(), 1..4),
    )
        .prop_map(|(subject, body, to)| {
            let mut msg = Message::new("noreply@example.com", subject, body);
            msg.to = to;
            msg
        })
}

//! The default outbound message model.
//!
//! The spool itself treats payloads as opaque bytes; this type is what the
//! bundled [`JsonCodec`](crate::codec::JsonCodec) is normally used with.

use serde::{Deserialize, Serialize};

use super::Address;

/// An outbound mail message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub from: Address,
    pub to: Vec<Address>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cc: Vec<Address>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bcc: Vec<Address>,
    pub subject: String,
    pub body: String,
}

impl Message {
    pub fn new(from: impl Into<Address>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Message {
            from: from.into(),
            to: Vec::new(),
            cc: Vec::new(),
            bcc: Vec::new(),
            subject: subject.into(),
            body: body.into(),
        }
    }

    /// Adds a `To` recipient.
    pub fn to(mut self, addr: impl Into<Address>) -> Self {
        self.to.push(addr.into());
        self
    }

    /// Adds a `Cc` recipient.
    pub fn cc(mut self, addr: impl Into<Address>) -> Self {
        self.cc.push(addr.into());
        self
    }

    /// Adds a `Bcc` recipient.
    pub fn bcc(mut self, addr: impl Into<Address>) -> Self {
        self.bcc.push(addr.into());
        self
    }

    /// All envelope recipients: to, then cc, then bcc.
    pub fn recipients(&self) -> impl Iterator<Item = &Address> {
        self.to.iter().chain(self.cc.iter()).chain(self.bcc.iter())
    }
}

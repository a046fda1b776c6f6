//! Core domain types for the mail spool.

pub mod ids;
pub mod message;

pub use ids::{Address, MessageId};
pub use message::Message;

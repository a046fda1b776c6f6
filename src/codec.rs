//! Encoding of messages to and from spool payload bytes.
//!
//! The spool stores opaque bytes. A [`MessageCodec`] turns them into whatever
//! message type the transport sends, so the store never depends on a
//! particular serialization format.

use std::fmt;
use std::marker::PhantomData;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Errors produced while encoding or decoding a payload.
#[derive(Debug, Error)]
pub enum CodecError {
    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The payload is structurally valid but not an acceptable message.
    #[error("invalid payload: {0}")]
    Invalid(String),
}

/// A pluggable encode/decode pair for spool payloads.
pub trait MessageCodec {
    /// The decoded message type.
    type Message;

    fn encode(&self, message: &Self::Message) -> Result<Vec<u8>, CodecError>;

    fn decode(&self, bytes: &[u8]) -> Result<Self::Message, CodecError>;
}

/// JSON codec for any serde-serializable message type.
pub struct JsonCodec<M> {
    _message: PhantomData<fn() -> M>,
}

impl<M> JsonCodec<M> {
    pub fn new() -> Self {
        JsonCodec {
            _message: PhantomData,
        }
    }
}

impl<M> Default for JsonCodec<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> Clone for JsonCodec<M> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<M> fmt::Debug for JsonCodec<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("JsonCodec")
    }
}

impl<M> MessageCodec for JsonCodec<M>
where
    M: Serialize + DeserializeOwned,
{
    type Message = M;

    fn encode(&self, message: &M) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(message)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<M, CodecError> {
        if bytes.is_empty() {
            return Err(CodecError::Invalid("empty payload".to_string()));
        }
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;

    #[test]
    fn decodes_what_it_encodes() {
        let codec = JsonCodec::<Message>::new();
        let msg = Message::new("from@example.com", "subject", "body").to("to@example.com");

        let bytes = codec.encode(&msg).unwrap();
        assert_eq!(codec.decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn empty_payload_is_invalid() {
        let codec = JsonCodec::<Message>::new();
        assert!(matches!(codec.decode(b""), Err(CodecError::Invalid(_))));
    }

    #[test]
    fn truncated_payload_is_a_json_error() {
        let codec = JsonCodec::<Message>::new();
        let bytes = codec
            .encode(&Message::new("a@example.com", "s", "b"))
            .unwrap();

        let result = codec.decode(&bytes[..bytes.len() / 2]);
        assert!(matches!(result, Err(CodecError::Json(_))));
    }
}

//! # Wire Codec
//!
//! The serialization seam between the message model and a transport.
//! The core never assumes a concrete encoding; it only requires that
//! `decode(encode(m)) == m`. `JsonCodec` is the default implementation.

use crate::error::Error;
use crate::error::Result;
use crate::message::Message;

/// Turns messages into transportable text and back.
///
/// Object-safe (`Box<dyn Codec>`) so a channel can be handed a custom
/// encoding without the core changing.
pub trait Codec: Send + Sync + 'static {
    fn encode(&self, message: &Message) -> Result<String>;
    fn decode(&self, text: &str) -> Result<Message>;
}

/// JSON rendition of the wire format.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(&self, message: &Message) -> Result<String> {
        serde_json::to_string(message).map_err(|e| Error::Encode(e.to_string()))
    }

    fn decode(&self, text: &str) -> Result<Message> {
        serde_json::from_str(text).map_err(|e| Error::Decode(e.to_string()))
    }
}

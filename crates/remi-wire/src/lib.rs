//! # Remi Wire
//!
//! The message model and codec contract for the remi RMI protocol.
//!
//! ## Architecture
//!
//! This crate defines the two envelope shapes that cross a transport
//! (`Invoke` and `Return`), the addressing forms an `Invoke` may carry
//! (`Target`), and the per-argument wire encoding (`WireArg`). Together
//! they are the compatibility surface: two independently built endpoints
//! interoperate as long as they exchange these shapes.
//!
//! ## Invariants
//!
//! - Every message carries `rmiId` (channel filter) and `correlationId`
//!   (Invoke/Return pairing). Correlation ids, not arrival order, pair a
//!   Return with its Invoke.
//! - Decoding never panics on unknown data; malformed text is an `Error`.

pub mod codec;
pub mod error;
pub mod message;

pub use codec::{Codec, JsonCodec};
pub use error::{Error, Result};
pub use message::{InvokeMessage, Message, ReturnFault, ReturnMessage, Target, WireArg};

#[cfg(test)]
mod tests;

//! # Transport Abstraction
//!
//! A minimal, async interface for moving serialized messages between
//! execution contexts.
//!
//! ## Philosophy
//!
//! - **Text-Oriented**: the transport knows nothing about Invoke frames,
//!   correlation, or marshalling. It moves opaque text.
//! - **No ordering contract**: per-direction delivery order is not relied
//!   upon; correlation ids, not order, pair requests with responses.
//! - **Transfer pass-through**: the `transfer_list` accompanying a send
//!   names buffers the transport may move without copying. The core never
//!   interprets it.

use std::fmt;

/// Errors that occur at the transport layer.
#[derive(Debug, Clone)]
pub enum Error {
    /// The peer is unreachable or the connection was dropped.
    ConnectionLost(String),
    /// The transport was closed on this side.
    Closed,
    /// Generic I/O error or internal transport failure.
    Io(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionLost(msg) => write!(f, "Connection lost: {}", msg),
            Self::Closed => write!(f, "Transport closed"),
            Self::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// A mechanism to move serialized messages to and from one peer.
///
/// Designed to be object-safe (`Arc<dyn Transport>`). The channel installs
/// itself as the receive listener by running a pump task that drains
/// `recv` until the stream ends.
///
/// # Invariants
/// - `send` must either deliver the text or return `Err`; it must not
///   interpret the content.
/// - `recv` returns `Ok(None)` exactly once, when the stream is closed.
/// - After `close`, `send` fails and `recv` drains to `Ok(None)`.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Sends one serialized message. `transfer_list` names buffers that
    /// may be moved without copying; transports without that ability
    /// ignore it.
    async fn send(&self, message: &str, transfer_list: &[u64]) -> Result<()>;

    /// Waits for the next inbound message. `None` means the stream closed.
    async fn recv(&self) -> Result<Option<String>>;

    /// Releases the underlying channel. Idempotent.
    fn close(&self);
}

//! Wire-level failures: a message that cannot be encoded or decoded.

/// Codec failures.
#[derive(Debug, Clone)]
pub enum Error {
    /// The message could not be serialized to wire text.
    Encode(String),
    /// The wire text could not be parsed back into a message.
    Decode(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Encode(msg) => write!(f, "Failed to encode message: {}", msg),
            Self::Decode(msg) => write!(f, "Failed to decode message: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

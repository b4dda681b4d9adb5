//! # Error Definitions
//!
//! The central ledger of invocation failures, plus `Fault`, the
//! application-level error a local method hands back across the wire.

use crate::transport;

/// Failures surfaced to callers of the invocation API.
#[derive(Debug, Clone)]
pub enum Error {
    /// A local method name was registered twice in one namespace.
    DuplicateMethod { channel: String, name: String },
    /// A local class id was registered twice in one registry.
    DuplicateClass { channel: String, class_id: String },
    /// The peer's method threw. Message and stack equal the original text
    /// exactly; no structured type crosses the wire.
    Remote { message: String, stack: String },
    /// An object reference could not be resolved on this side.
    UnknownTarget(String),
    /// `release` was called with something that is not a live remote proxy
    /// of this channel.
    InvalidReleaseTarget(String),
    /// The channel was destroyed; terminal for every outstanding and
    /// subsequent call.
    ChannelClosed,
    /// An argument does not satisfy its declared parameter role.
    BadArgumentRole {
        index: usize,
        expected: &'static str,
        found: &'static str,
    },
    /// The peer answered with a value the protocol does not allow here.
    UnexpectedValue(String),
    Transport(transport::Error),
    Wire(remi_wire::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateMethod { channel, name } => write!(
                f,
                "Duplicate local method name in namespace, namespace: {}, method name: {}",
                channel, name
            ),
            Self::DuplicateClass { channel, class_id } => write!(
                f,
                "Duplicate local class id in channel '{}': {}",
                channel, class_id
            ),
            Self::Remote { message, .. } => write!(f, "Remote method failed: {}", message),
            Self::UnknownTarget(msg) => write!(f, "Unknown target: {}", msg),
            Self::InvalidReleaseTarget(msg) => write!(f, "Invalid release target: {}", msg),
            Self::ChannelClosed => write!(f, "Channel destroyed"),
            Self::BadArgumentRole { index, expected, found } => write!(
                f,
                "Argument {} does not match its declared role: expected {}, found {}",
                index, expected, found
            ),
            Self::UnexpectedValue(msg) => write!(f, "Unexpected reply value: {}", msg),
            Self::Transport(e) => write!(f, "Transport error: {}", e),
            Self::Wire(e) => write!(f, "Wire error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(e) => Some(e),
            Self::Wire(e) => Some(e),
            _ => None,
        }
    }
}

impl From<transport::Error> for Error {
    fn from(e: transport::Error) -> Self {
        Self::Transport(e)
    }
}

impl From<remi_wire::Error> for Error {
    fn from(e: remi_wire::Error) -> Self {
        Self::Wire(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// What a local method reports when it fails: the textual message and
/// stack that will be delivered verbatim in the failure Return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub message: String,
    pub stack: String,
}

impl Fault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: String::new(),
        }
    }

    pub fn with_stack(message: impl Into<String>, stack: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: stack.into(),
        }
    }
}

impl std::fmt::Display for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Fault {}

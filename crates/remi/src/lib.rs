//! # Remi
//!
//! Remote method invocation between two physically separated execution
//! contexts, over any transport that can move serialized text.
//!
//! ## Architecture
//!
//! A `Channel` pairs with a peer `Channel` over a transport adapter. Each
//! side registers local methods and classes (`lmethod`/`lclass`) and builds
//! proxies for the peer's (`rmethod`/`rclass`). A proxy call marshals its
//! arguments by declared parameter role, sends an `Invoke` with a fresh
//! correlation id, and resolves when the matching `Return` arrives. Remote
//! errors surface with their original message and stack text.
//!
//! ## Philosophy
//!
//! - **Transport-agnostic**: the core never inspects how bytes move; it
//!   only tags every message with the channel id and ignores the rest.
//! - **Correlation, not order**: concurrent calls resolve independently as
//!   their Returns arrive. No ordering between completions is assumed.
//! - **No hidden retries**: every failure is terminal for that call.

pub mod channel;
pub mod error;
pub mod local;
pub mod marshal;
pub mod metadata;
pub mod namespace;
pub mod registry;
pub mod transport;

mod adaptor;

pub use channel::Channel;
pub use error::{Error, Fault, Result};
pub use local::LocalTransport;
pub use marshal::{Arg, CallbackStub, Inbound, ObjectHandle};
pub use metadata::{ClassShape, MethodMetadata, ParamRole};
pub use namespace::{LocalMethod, RemoteMethod};
pub use registry::{RemoteClass, RemoteInstance, ServiceObject};
pub use transport::Transport;

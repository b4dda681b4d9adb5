//! # Protocol Messages
//!
//! Defines the structure of the RMI envelope (Invoke vs Return).
//!
//! ## Invariants
//!
//! - A `Target` is exactly one of: bare method name, instance method,
//!   construct request, or release request. The shapes share no field
//!   layout, so untagged deserialization is unambiguous.
//! - `transferList` is opaque to this crate; it is carried for the
//!   transport adapter, which may use it to move buffers without copying.

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

/// Top-level wire message, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    #[serde(rename = "invoke")]
    Invoke(InvokeMessage),
    #[serde(rename = "return")]
    Return(ReturnMessage),
}

impl Message {
    /// The channel id this message is addressed to.
    pub fn rmi_id(&self) -> &str {
        match self {
            Self::Invoke(m) => &m.rmi_id,
            Self::Return(m) => &m.rmi_id,
        }
    }

    pub fn correlation_id(&self) -> u64 {
        match self {
            Self::Invoke(m) => m.correlation_id,
            Self::Return(m) => m.correlation_id,
        }
    }
}

/// A request to execute a method, constructor, or release on the peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokeMessage {
    pub rmi_id: String,
    /// Caller-assigned token pairing this Invoke with its eventual Return.
    pub correlation_id: u64,
    pub target: Target,
    pub args: Vec<WireArg>,
    /// Identifiers of buffers the transport should move without copying.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transfer_list: Vec<u64>,
}

/// The outcome of a prior Invoke, correlated by `correlationId`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnMessage {
    pub rmi_id: String,
    pub correlation_id: u64,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ReturnFault>,
}

impl ReturnMessage {
    pub fn success(rmi_id: impl Into<String>, correlation_id: u64, value: Value) -> Self {
        Self {
            rmi_id: rmi_id.into(),
            correlation_id,
            ok: true,
            value: Some(value),
            error: None,
        }
    }

    pub fn failure(rmi_id: impl Into<String>, correlation_id: u64, fault: ReturnFault) -> Self {
        Self {
            rmi_id: rmi_id.into(),
            correlation_id,
            ok: false,
            value: None,
            error: Some(fault),
        }
    }
}

/// The textual remains of a remote error. Stack text is opaque: the
/// contract is equality of whatever string the throwing side produced,
/// never structural parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnFault {
    pub message: String,
    #[serde(default)]
    pub stack: String,
}

/// What an Invoke is addressed at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged, rename_all_fields = "camelCase")]
pub enum Target {
    /// A namespace-level method, by bare name.
    Method(String),
    /// A method on an instance previously exported by the receiver.
    Instance {
        class_id: String,
        instance_id: String,
        method_name: String,
    },
    /// A construct request: instantiate the named class and export it.
    Construct { class_id: String },
    /// A release request: drop the exported instance.
    Release { instance_id: String },
}

/// One marshalled argument position, tagged by `kind` with the declared
/// parameter role it was sent under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum WireArg {
    /// A plain serializable value.
    Plain { value: Value },
    /// A serializable value whose backing buffer is listed for transfer.
    Buffer { value: Value, transfer_id: u64 },
    /// A reference to a function registered in the *sender's* namespace.
    Callback { name: String },
    /// A reference to a remote-class instance.
    Instance { class_id: String, instance_id: String },
}

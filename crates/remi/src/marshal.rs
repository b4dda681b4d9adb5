//! # Argument Marshalling
//!
//! Turns caller-side arguments into wire form and back, driven by the
//! declared parameter role of each position.
//!
//! ## Invariants
//!
//! - Marshalling a call is synchronous and completes before the Invoke is
//!   handed to the transport; no interleaving mid-marshal.
//! - A role/argument mismatch fails the call before anything is sent.
//! - Callback forwarding is fire-and-forget: errors inside it are logged,
//!   never surfaced to the remote caller.

use std::sync::Arc;
use std::sync::Weak;

use serde_json::Value;

use remi_wire::Target;
use remi_wire::WireArg;

use crate::channel::Core;
use crate::error::Error;
use crate::error::Result;
use crate::metadata::MethodMetadata;
use crate::metadata::ParamRole;
use crate::registry::ServiceObject;
use crate::registry::RemoteInstance;

/// A caller-supplied callback, invoked with the forwarded arguments each
/// time the remote side calls it.
pub type CallbackFn = Arc<dyn Fn(Vec<Value>) + Send + Sync>;

/// One argument of an outgoing call.
pub enum Arg {
    /// A plain serializable value.
    Value(Value),
    /// A serializable value backed by a buffer the transport may move;
    /// `transfer` is the buffer's identifier, opaque to the core.
    Buffer { value: Value, transfer: u64 },
    /// A function forwarded by reference.
    Callback(CallbackFn),
    /// A remote-class instance passed by reference.
    Object(ObjectHandle),
}

impl Arg {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::Value(_) => "value",
            Self::Buffer { .. } => "buffer",
            Self::Callback(_) => "callback",
            Self::Object(_) => "object",
        }
    }
}

impl From<Value> for Arg {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

/// A reference to a remote-class instance, seen from one side.
#[derive(Clone)]
pub enum ObjectHandle {
    /// The original object: either registered here, or an inbound
    /// reference that short-circuited back to its home side.
    Local(Arc<dyn ServiceObject>),
    /// A proxy for an instance living on the peer.
    Remote(RemoteInstance),
}

/// One argument of an incoming call, as a local method sees it.
pub enum Inbound {
    Value(Value),
    Callback(CallbackStub),
    Object(ObjectHandle),
}

impl Inbound {
    /// The plain value of this argument; `Null` for non-value roles.
    pub fn into_value(self) -> Value {
        match self {
            Self::Value(v) => v,
            _ => Value::Null,
        }
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_callback(self) -> Option<CallbackStub> {
        match self {
            Self::Callback(cb) => Some(cb),
            _ => None,
        }
    }

    pub fn into_object(self) -> Option<ObjectHandle> {
        match self {
            Self::Object(obj) => Some(obj),
            _ => None,
        }
    }
}

/// The receiving side's handle to a callback argument.
///
/// Calling it issues a fresh Invoke against the generated name the sender
/// registered in its own namespace. The nested call's return value is
/// never consumed.
#[derive(Clone)]
pub struct CallbackStub {
    pub(crate) core: Weak<Core>,
    pub(crate) name: String,
}

impl CallbackStub {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Forwards one invocation to the originating function. Only value
    /// and buffer arguments travel; anything else drops the invocation.
    /// All failures are swallowed.
    pub async fn call(&self, args: Vec<Arg>) {
        let Some(core) = self.core.upgrade() else {
            return;
        };

        let mut wire_args = Vec::with_capacity(args.len());
        let mut transfer_list = Vec::new();
        for arg in args {
            match arg {
                Arg::Value(value) => wire_args.push(WireArg::Plain { value }),
                Arg::Buffer { value, transfer } => {
                    wire_args.push(WireArg::Buffer { value, transfer_id: transfer });
                    transfer_list.push(transfer);
                }
                other => {
                    tracing::debug!(
                        callback = %self.name,
                        kind = other.kind(),
                        "Dropping callback invocation with non-value argument"
                    );
                    return;
                }
            }
        }

        if let Err(e) = core
            .adaptor
            .invoke_forget(
                &core.rmi_id,
                Target::Method(self.name.clone()),
                wire_args,
                transfer_list,
            )
            .await
        {
            tracing::debug!(callback = %self.name, error = %e, "Callback forwarding failed");
        }
    }
}

/// Marshals one call's arguments per the declared roles. Returns the wire
/// arguments and the accumulated transfer list.
pub(crate) fn marshal_args(
    core: &Core,
    metadata: &MethodMetadata,
    args: Vec<Arg>,
) -> Result<(Vec<WireArg>, Vec<u64>)> {
    let mut wire_args = Vec::with_capacity(args.len());
    let mut transfer_list = Vec::new();

    for (index, arg) in args.into_iter().enumerate() {
        let role = metadata.role(index);
        let wire = match (role, arg) {
            (ParamRole::Serializable, Arg::Value(value)) => WireArg::Plain { value },
            (ParamRole::Transferable, Arg::Buffer { value, transfer }) => {
                transfer_list.push(transfer);
                WireArg::Buffer { value, transfer_id: transfer }
            }
            (ParamRole::Callback, Arg::Callback(callback)) => WireArg::Callback {
                name: core.register_callback(callback),
            },
            (ParamRole::RemoteObject, Arg::Object(handle)) => {
                core.registry.wire_ref_for(core, &handle)?
            }
            (role, arg) => {
                return Err(Error::BadArgumentRole {
                    index,
                    expected: role.as_str(),
                    found: arg.kind(),
                });
            }
        };
        wire_args.push(wire);
    }

    Ok((wire_args, transfer_list))
}

/// Reconstructs local argument handles from wire form.
pub(crate) fn unmarshal_args(core: &Arc<Core>, args: Vec<WireArg>) -> Vec<Inbound> {
    args.into_iter()
        .map(|arg| match arg {
            WireArg::Plain { value } => Inbound::Value(value),
            // The transfer already happened at the transport layer; the
            // receiver sees the value like any other.
            WireArg::Buffer { value, .. } => Inbound::Value(value),
            WireArg::Callback { name } => Inbound::Callback(CallbackStub {
                core: Arc::downgrade(core),
                name,
            }),
            WireArg::Instance { class_id, instance_id } => {
                Inbound::Object(core.registry.resolve_wire_ref(core, class_id, instance_id))
            }
        })
        .collect()
}

//! # Channel
//!
//! The top-level façade composing the namespace, instance registry, and
//! message adaptor over one transport. A channel pairs with exactly one
//! peer channel carrying the same id; traffic for other ids on the same
//! transport is ignored.
//!
//! ## Architecture
//!
//! `Channel::new` spawns a pump task that drains the transport: Returns
//! settle their pending correlation inline, user-method Invokes dispatch
//! on their own task so a running handler can drive nested traffic
//! without starving the pump, and callback Invokes run inline so forwarded
//! invocations reach the original function in arrival order on any
//! runtime flavor. Every dispatched Invoke is answered with exactly one
//! Return, success or failure. Unknown targets answer; they never hang.
//!
//! ## State machine
//!
//! `Open → Destroyed`, one-way and terminal. Destruction clears both
//! registries, force-rejects everything pending, and releases the
//! transport; all operations except `destroy` fail afterwards.

use std::future::Future;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use serde_json::Value;
use tokio::task::JoinHandle;

use remi_wire::Codec;
use remi_wire::InvokeMessage;
use remi_wire::JsonCodec;
use remi_wire::Message;
use remi_wire::Target;

use crate::adaptor::Adaptor;
use crate::error::Error;
use crate::error::Fault;
use crate::error::Result;
use crate::marshal;
use crate::marshal::Arg;
use crate::marshal::CallbackFn;
use crate::marshal::Inbound;
use crate::metadata::ClassShape;
use crate::metadata::MethodMetadata;
use crate::namespace;
use crate::namespace::LocalMethod;
use crate::namespace::Namespace;
use crate::namespace::RemoteMethod;
use crate::registry::Constructor;
use crate::registry::InstanceRegistry;
use crate::registry::RemoteClass;
use crate::registry::RemoteInstance;
use crate::registry::ServiceObject;
use crate::transport::Transport;

/// Shared state behind one channel: everything proxies and the pump need.
pub(crate) struct Core {
    pub(crate) rmi_id: String,
    pub(crate) adaptor: Adaptor,
    pub(crate) namespace: Namespace,
    pub(crate) registry: InstanceRegistry,
    callback_seq: AtomicU64,
    destroyed: AtomicBool,
}

impl Core {
    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(Error::ChannelClosed);
        }
        Ok(())
    }

    /// Marshals and sends one remote call, resolving with its Return.
    ///
    /// Marshalling is synchronous and completes before the Invoke is
    /// handed to the transport.
    pub(crate) async fn call_remote(
        &self,
        target: Target,
        metadata: &MethodMetadata,
        args: Vec<Arg>,
    ) -> Result<Value> {
        self.ensure_open()?;
        let (wire_args, transfer_list) = marshal::marshal_args(self, metadata, args)?;
        self.adaptor
            .invoke(&self.rmi_id, target, wire_args, transfer_list)
            .await
    }

    /// Registers a callback under a fresh generated name in this side's
    /// namespace and returns the name sent over the wire. Registrations
    /// live until channel destruction.
    pub(crate) fn register_callback(&self, callback: CallbackFn) -> String {
        let name = format!(
            "{}{}",
            namespace::CALLBACK_PREFIX,
            self.callback_seq.fetch_add(1, Ordering::Relaxed)
        );
        self.namespace
            .register_internal(name.clone(), namespace::callback_method(callback));
        name
    }
}

/// Routes one raw inbound message.
async fn route(core: &Arc<Core>, text: &str) {
    let message = match core.adaptor.decode(text) {
        Ok(message) => message,
        Err(e) => {
            tracing::debug!(channel = %core.rmi_id, error = %e, "Skipping undecodable message");
            return;
        }
    };

    // Other channels may share this transport; their traffic is not ours.
    if message.rmi_id() != core.rmi_id {
        tracing::debug!(
            channel = %core.rmi_id,
            foreign = message.rmi_id(),
            "Ignoring message for another channel"
        );
        return;
    }

    match message {
        Message::Return(ret) => core.adaptor.settle(ret),
        Message::Invoke(invoke) => {
            // Callback invocations must reach the original function in
            // arrival order, so they run inline. A callback handler never
            // awaits nested traffic, so the pump cannot starve on one.
            // User-method Invokes keep their own tasks: a handler may
            // drive nested calls, and no cross-call order is promised.
            if is_callback_invoke(&invoke) {
                dispatch(Arc::clone(core), invoke).await;
            } else {
                let core = Arc::clone(core);
                tokio::spawn(async move {
                    dispatch(core, invoke).await;
                });
            }
        }
    }
}

fn is_callback_invoke(invoke: &InvokeMessage) -> bool {
    matches!(&invoke.target, Target::Method(name) if name.starts_with(namespace::CALLBACK_PREFIX))
}

/// Executes one inbound Invoke and answers with exactly one Return.
async fn dispatch(core: Arc<Core>, invoke: InvokeMessage) {
    let correlation_id = invoke.correlation_id;
    let outcome = execute(&core, invoke).await;

    if let Err(e) = core
        .adaptor
        .send_return(&core.rmi_id, correlation_id, outcome)
        .await
    {
        tracing::warn!(
            channel = %core.rmi_id,
            correlation = correlation_id,
            error = %e,
            "Failed to send Return"
        );
    }
}

async fn execute(core: &Arc<Core>, invoke: InvokeMessage) -> std::result::Result<Value, Fault> {
    match invoke.target {
        Target::Method(name) => {
            let Some(method) = core.namespace.get(&name) else {
                return Err(Fault::new(format!(
                    "No local method '{}' registered in channel '{}'",
                    name, core.rmi_id
                )));
            };
            let args = marshal::unmarshal_args(core, invoke.args);
            method(args).await
        }
        Target::Construct { class_id } => {
            let Some(ctor) = core.registry.constructor(&class_id) else {
                return Err(Fault::new(format!(
                    "No local class '{}' registered in channel '{}'",
                    class_id, core.rmi_id
                )));
            };
            let args = marshal::unmarshal_args(core, invoke.args);
            let object = ctor(args)?;
            let instance_id = core.registry.export(class_id, object);
            Ok(Value::String(instance_id))
        }
        Target::Instance { class_id, instance_id, method_name } => {
            let Some(object) = core.registry.exported_object(&instance_id) else {
                return Err(Fault::new(format!(
                    "No instance '{}' of class '{}' in channel '{}'",
                    instance_id, class_id, core.rmi_id
                )));
            };
            let args = marshal::unmarshal_args(core, invoke.args);
            object.call(&method_name, args).await
        }
        Target::Release { instance_id } => {
            if core.registry.remove_exported(&instance_id) {
                Ok(Value::Bool(true))
            } else {
                Err(Fault::new(format!(
                    "Cannot release unknown instance '{}' in channel '{}'",
                    instance_id, core.rmi_id
                )))
            }
        }
    }
}

/// One endpoint of an RMI channel.
pub struct Channel {
    core: Arc<Core>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl Channel {
    /// Creates a channel over `transport` with the default JSON codec.
    pub fn new(channel_id: impl Into<String>, transport: Box<dyn Transport>) -> Self {
        Self::with_codec(channel_id, transport, Box::new(JsonCodec))
    }

    /// Creates a channel with a custom wire codec.
    pub fn with_codec(
        channel_id: impl Into<String>,
        transport: Box<dyn Transport>,
        codec: Box<dyn Codec>,
    ) -> Self {
        let channel_id = channel_id.into();
        let core = Arc::new(Core {
            rmi_id: channel_id.clone(),
            adaptor: Adaptor::new(transport, codec),
            namespace: Namespace::new(channel_id.clone()),
            registry: InstanceRegistry::new(channel_id),
            callback_seq: AtomicU64::new(1),
            destroyed: AtomicBool::new(false),
        });
        let pump = spawn_pump(Arc::clone(&core));

        Self {
            core,
            pump: Mutex::new(Some(pump)),
        }
    }

    pub fn id(&self) -> &str {
        &self.core.rmi_id
    }

    /// Registers a local method the peer can invoke by name.
    pub fn lmethod<F, Fut>(&self, name: &str, f: F) -> Result<()>
    where
        F: Fn(Vec<Inbound>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Value, Fault>> + Send + 'static,
    {
        self.core.ensure_open()?;
        self.core
            .namespace
            .register(name, namespace::into_local_method(f))
    }

    /// Whether a local method is registered under `name`.
    pub fn has_lmethod(&self, name: &str) -> bool {
        self.core.namespace.contains(name)
    }

    /// Returns the local method registered under `name`, if any. The
    /// binding can be invoked directly, without a round trip.
    pub fn local_method(&self, name: &str) -> Option<LocalMethod> {
        self.core.namespace.get(name)
    }

    /// Returns the memoized remote stub for `name`, all positions
    /// serializable.
    pub fn rmethod(&self, name: &str) -> Result<RemoteMethod> {
        self.rmethod_with(MethodMetadata::new(name))
    }

    /// Returns the memoized remote stub for the declared metadata. The
    /// metadata supplied at first request sticks; later requests for the
    /// same name return the original stub unchanged.
    pub fn rmethod_with(&self, metadata: MethodMetadata) -> Result<RemoteMethod> {
        self.core.ensure_open()?;
        Ok(self.core.namespace.stub(&self.core, metadata))
    }

    /// Registers a constructible local class the peer can instantiate.
    pub fn lclass<F>(&self, class_id: &str, ctor: F) -> Result<()>
    where
        F: Fn(Vec<Inbound>) -> std::result::Result<Arc<dyn ServiceObject>, Fault>
            + Send
            + Sync
            + 'static,
    {
        self.core.ensure_open()?;
        let ctor: Constructor = Arc::new(ctor);
        self.core.registry.register_class(class_id, ctor)
    }

    /// Builds a proxy constructor for a class exported by the peer.
    pub fn rclass(&self, shape: ClassShape) -> Result<RemoteClass> {
        self.core.ensure_open()?;
        Ok(RemoteClass::new(Arc::downgrade(&self.core), shape))
    }

    /// Releases a remote instance obtained through `rclass`. Resolves
    /// `true` on success; fails if the instance was already released or
    /// is not tracked by this channel.
    pub async fn release(&self, instance: &RemoteInstance) -> Result<bool> {
        self.core.ensure_open()?;

        if !instance.belongs_to(&self.core)
            || !self.core.registry.imported_contains(instance.instance_id())
        {
            return Err(Error::InvalidReleaseTarget(format!(
                "Instance '{}' is not a live remote proxy of channel '{}'",
                instance.instance_id(),
                self.core.rmi_id
            )));
        }

        let value = self
            .core
            .call_remote(
                Target::Release { instance_id: instance.instance_id().to_string() },
                &MethodMetadata::new("#release"),
                Vec::new(),
            )
            .await?;

        self.core.registry.remove_imported(instance.instance_id());

        match value {
            Value::Bool(true) => Ok(true),
            other => Err(Error::UnexpectedValue(format!(
                "Release reply is not `true`: {}",
                other
            ))),
        }
    }

    /// Destroys the channel: clears both registries, rejects everything
    /// pending with `ChannelClosed`, and releases the transport.
    /// Idempotent; every other operation fails afterwards.
    pub fn destroy(&self) {
        if self.core.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.core.namespace.clear();
        self.core.registry.clear();
        self.core.adaptor.reject_all();
        self.core.adaptor.close();

        if let Ok(mut pump) = self.pump.lock() {
            if let Some(handle) = pump.take() {
                handle.abort();
            }
        }
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Spawns the receive pump: the installed listener on the transport.
fn spawn_pump(core: Arc<Core>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match core.adaptor.recv().await {
                Ok(Some(text)) => route(&core, &text).await,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(channel = %core.rmi_id, error = %e, "Transport failed");
                    break;
                }
            }
        }
        // Stream over: nothing outstanding can ever settle.
        core.adaptor.reject_all();
    })
}

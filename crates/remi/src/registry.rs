//! # Instance Registry & Remote-Class Proxying
//!
//! Tracks live remote-class instances on both sides of one channel:
//! exported instances (constructed here, reachable by the peer) and
//! imported instances (constructed on the peer, proxied here).
//!
//! ## Invariants
//!
//! - Instance ids are random (v4 uuid) so the exported/imported arenas of
//!   the two sides can never collide; an id is never reused after release.
//! - Resolving an inbound instance reference checks the exported arena
//!   first: an object returning to its home side short-circuits to the
//!   original, never to a duplicate proxy.

use std::sync::Arc;
use std::sync::Weak;

use dashmap::DashMap;
use serde_json::Value;
use uuid::Uuid;

use remi_wire::Target;
use remi_wire::WireArg;

use crate::channel::Core;
use crate::error::Error;
use crate::error::Fault;
use crate::error::Result;
use crate::marshal::Arg;
use crate::marshal::Inbound;
use crate::marshal::ObjectHandle;
use crate::metadata::ClassShape;
use crate::metadata::MethodMetadata;

/// The behavior seam a local class instance implements: dynamic dispatch
/// by method name over unmarshalled arguments.
#[async_trait::async_trait]
pub trait ServiceObject: Send + Sync + 'static {
    async fn call(&self, method: &str, args: Vec<Inbound>) -> std::result::Result<Value, Fault>;
}

/// Builds one instance of a registered local class.
pub type Constructor =
    Arc<dyn Fn(Vec<Inbound>) -> std::result::Result<Arc<dyn ServiceObject>, Fault> + Send + Sync>;

struct ExportedEntry {
    class_id: String,
    object: Arc<dyn ServiceObject>,
}

/// Per-channel bookkeeping of classes and instances. Cleared on channel
/// destruction.
pub(crate) struct InstanceRegistry {
    channel: String,
    classes: DashMap<String, Constructor>,
    exported: DashMap<String, ExportedEntry>,
    imported: DashMap<String, RemoteInstance>,
}

impl InstanceRegistry {
    pub(crate) fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            classes: DashMap::new(),
            exported: DashMap::new(),
            imported: DashMap::new(),
        }
    }

    pub(crate) fn register_class(&self, class_id: &str, ctor: Constructor) -> Result<()> {
        if self.classes.contains_key(class_id) {
            return Err(Error::DuplicateClass {
                channel: self.channel.clone(),
                class_id: class_id.to_string(),
            });
        }
        self.classes.insert(class_id.to_string(), ctor);
        Ok(())
    }

    pub(crate) fn constructor(&self, class_id: &str) -> Option<Constructor> {
        self.classes.get(class_id).map(|entry| Arc::clone(entry.value()))
    }

    /// Stores a freshly constructed instance and returns its new id.
    pub(crate) fn export(&self, class_id: String, object: Arc<dyn ServiceObject>) -> String {
        let instance_id = Uuid::new_v4().to_string();
        self.exported
            .insert(instance_id.clone(), ExportedEntry { class_id, object });
        instance_id
    }

    pub(crate) fn exported_object(&self, instance_id: &str) -> Option<Arc<dyn ServiceObject>> {
        self.exported
            .get(instance_id)
            .map(|entry| Arc::clone(&entry.value().object))
    }

    pub(crate) fn remove_exported(&self, instance_id: &str) -> bool {
        self.exported.remove(instance_id).is_some()
    }

    pub(crate) fn import(&self, instance: RemoteInstance) {
        self.imported
            .insert(instance.instance_id().to_string(), instance);
    }

    pub(crate) fn imported_contains(&self, instance_id: &str) -> bool {
        self.imported.contains_key(instance_id)
    }

    pub(crate) fn remove_imported(&self, instance_id: &str) {
        self.imported.remove(instance_id);
    }

    /// Resolves an inbound `{classId, instanceId}` reference. Exported
    /// first (identity short-circuit), then reuse of an existing imported
    /// proxy, then a fresh proxy targeting the sender.
    pub(crate) fn resolve_wire_ref(
        &self,
        core: &Arc<Core>,
        class_id: String,
        instance_id: String,
    ) -> ObjectHandle {
        if let Some(object) = self.exported_object(&instance_id) {
            return ObjectHandle::Local(object);
        }
        if let Some(existing) = self.imported.get(&instance_id) {
            return ObjectHandle::Remote(existing.clone());
        }
        let proxy = RemoteInstance::new(Arc::downgrade(core), class_id, instance_id, None);
        self.import(proxy.clone());
        ObjectHandle::Remote(proxy)
    }

    /// Encodes an outbound object argument. A remote proxy sends its own
    /// coordinates; a local object must be found in the exported arena by
    /// identity, since only exported objects are addressable by the peer.
    pub(crate) fn wire_ref_for(&self, core: &Core, handle: &ObjectHandle) -> Result<WireArg> {
        match handle {
            ObjectHandle::Remote(instance) => {
                if !instance.belongs_to(core) {
                    return Err(Error::UnknownTarget(format!(
                        "Instance '{}' belongs to another channel",
                        instance.instance_id()
                    )));
                }
                Ok(WireArg::Instance {
                    class_id: instance.class_id().to_string(),
                    instance_id: instance.instance_id().to_string(),
                })
            }
            ObjectHandle::Local(object) => {
                let entry = self
                    .exported
                    .iter()
                    .find(|entry| Arc::ptr_eq(&entry.value().object, object))
                    .map(|entry| {
                        (entry.key().clone(), entry.value().class_id.clone())
                    });
                let (instance_id, class_id) = entry.ok_or_else(|| {
                    Error::UnknownTarget(format!(
                        "Object is not exported by channel '{}'",
                        self.channel
                    ))
                })?;
                Ok(WireArg::Instance { class_id, instance_id })
            }
        }
    }

    pub(crate) fn clear(&self) {
        self.classes.clear();
        self.exported.clear();
        self.imported.clear();
    }
}

/// A proxy constructor for a class exported by the peer.
///
/// Instantiating it sends a construct Invoke; the peer runs the real
/// constructor, exports the result, and answers with the fresh instance
/// id the proxy then targets.
#[derive(Debug)]
pub struct RemoteClass {
    core: Weak<Core>,
    shape: Arc<ClassShape>,
}

impl RemoteClass {
    pub(crate) fn new(core: Weak<Core>, shape: ClassShape) -> Self {
        Self {
            core,
            shape: Arc::new(shape),
        }
    }

    pub fn class_id(&self) -> &str {
        self.shape.class_id()
    }

    /// Constructs a remote instance with the given constructor arguments.
    pub async fn construct(&self, args: Vec<Arg>) -> Result<RemoteInstance> {
        let core = self.core.upgrade().ok_or(Error::ChannelClosed)?;
        let value = core
            .call_remote(
                Target::Construct { class_id: self.class_id().to_string() },
                &self.shape.ctor_metadata(),
                args,
            )
            .await?;

        let Value::String(instance_id) = value else {
            return Err(Error::UnexpectedValue(format!(
                "Construct reply for class '{}' is not an instance id",
                self.class_id()
            )));
        };

        let instance = RemoteInstance::new(
            self.core.clone(),
            self.class_id().to_string(),
            instance_id,
            Some(Arc::clone(&self.shape)),
        );
        core.registry.import(instance.clone());
        Ok(instance)
    }
}

/// A proxy for one instance living on the peer.
///
/// Cheap to clone; all clones share one identity. Method calls dispatch
/// by name with the roles the class shape declared (default roles for
/// undeclared names).
#[derive(Debug, Clone)]
pub struct RemoteInstance {
    inner: Arc<InstanceInner>,
}

#[derive(Debug)]
struct InstanceInner {
    core: Weak<Core>,
    class_id: String,
    instance_id: String,
    shape: Option<Arc<ClassShape>>,
}

impl RemoteInstance {
    pub(crate) fn new(
        core: Weak<Core>,
        class_id: String,
        instance_id: String,
        shape: Option<Arc<ClassShape>>,
    ) -> Self {
        Self {
            inner: Arc::new(InstanceInner {
                core,
                class_id,
                instance_id,
                shape,
            }),
        }
    }

    pub fn class_id(&self) -> &str {
        &self.inner.class_id
    }

    pub fn instance_id(&self) -> &str {
        &self.inner.instance_id
    }

    /// Invokes `method` on the original object behind this proxy.
    pub async fn invoke(&self, method: &str, args: Vec<Arg>) -> Result<Value> {
        let core = self.inner.core.upgrade().ok_or(Error::ChannelClosed)?;
        let metadata = self
            .inner
            .shape
            .as_ref()
            .and_then(|shape| shape.method_metadata(method))
            .cloned()
            .unwrap_or_else(|| MethodMetadata::new(method));

        core.call_remote(
            Target::Instance {
                class_id: self.inner.class_id.clone(),
                instance_id: self.inner.instance_id.clone(),
                method_name: method.to_string(),
            },
            &metadata,
            args,
        )
        .await
    }

    /// Convenience for all-serializable invocations.
    pub async fn invoke_values(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        self.invoke(method, args.into_iter().map(Arg::Value).collect())
            .await
    }

    pub(crate) fn belongs_to(&self, core: &Core) -> bool {
        std::ptr::eq(self.inner.core.as_ptr(), core)
    }
}

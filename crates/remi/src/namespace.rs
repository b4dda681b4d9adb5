//! # Namespace
//!
//! Per-channel registry of local method implementations and memoized
//! remote-invocation stubs.
//!
//! ## Invariants
//!
//! - Registering a name twice fails; the first registration stays live.
//! - Asking for the same remote stub twice returns the same stub; the
//!   metadata supplied at first request is the one that sticks.
//! - Generated callback registrations use the reserved `#cb-` prefix and
//!   bypass the duplicate check.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::Weak;

use dashmap::DashMap;
use serde_json::Value;

use remi_wire::Target;

use crate::channel::Core;
use crate::error::Error;
use crate::error::Fault;
use crate::error::Result;
use crate::marshal;
use crate::marshal::Arg;
use crate::marshal::Inbound;
use crate::metadata::MethodMetadata;

/// Reserved name prefix for generated callback registrations.
pub(crate) const CALLBACK_PREFIX: &str = "#cb-";

/// The future a local method resolves with.
pub type MethodFuture = Pin<Box<dyn Future<Output = std::result::Result<Value, Fault>> + Send>>;

/// A registered local method: invoked with unmarshalled arguments,
/// resolving to the value carried back in the Return.
pub type LocalMethod = Arc<dyn Fn(Vec<Inbound>) -> MethodFuture + Send + Sync>;

/// Registry of local implementations and cached remote stubs for one
/// channel. Cleared on channel destruction.
pub(crate) struct Namespace {
    id: String,
    locals: DashMap<String, LocalMethod>,
    stubs: DashMap<String, RemoteMethod>,
}

impl Namespace {
    pub(crate) fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            locals: DashMap::new(),
            stubs: DashMap::new(),
        }
    }

    /// Binds `name` to a local implementation.
    pub(crate) fn register(&self, name: &str, method: LocalMethod) -> Result<()> {
        if self.locals.contains_key(name) {
            return Err(Error::DuplicateMethod {
                channel: self.id.clone(),
                name: name.to_string(),
            });
        }
        self.locals.insert(name.to_string(), method);
        Ok(())
    }

    /// Binds a generated callback name, shadowing nothing: callers never
    /// see these names, so the duplicate check does not apply.
    pub(crate) fn register_internal(&self, name: String, method: LocalMethod) {
        self.locals.insert(name, method);
    }

    pub(crate) fn get(&self, name: &str) -> Option<LocalMethod> {
        self.locals.get(name).map(|entry| Arc::clone(entry.value()))
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.locals.contains_key(name)
    }

    /// Returns the memoized stub for `name`, creating it on first request.
    pub(crate) fn stub(&self, core: &Arc<Core>, metadata: MethodMetadata) -> RemoteMethod {
        self.stubs
            .entry(metadata.name().to_string())
            .or_insert_with(|| RemoteMethod::new(Arc::downgrade(core), metadata))
            .clone()
    }

    pub(crate) fn clear(&self) {
        self.locals.clear();
        self.stubs.clear();
    }
}

/// A proxy for one namespace-level method on the peer.
///
/// Cheap to clone; every clone obtained for the same name shares one
/// underlying stub. Holds only a weak reference to its channel, so calls
/// after destruction fail with `ChannelClosed`.
#[derive(Debug, Clone)]
pub struct RemoteMethod {
    inner: Arc<StubInner>,
}

#[derive(Debug)]
struct StubInner {
    core: Weak<Core>,
    metadata: MethodMetadata,
}

impl RemoteMethod {
    fn new(core: Weak<Core>, metadata: MethodMetadata) -> Self {
        Self {
            inner: Arc::new(StubInner { core, metadata }),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.metadata.name()
    }

    /// Marshals `args` per the declared roles, sends an Invoke, and
    /// resolves with the peer's Return.
    pub async fn call(&self, args: Vec<Arg>) -> Result<Value> {
        let core = self.inner.core.upgrade().ok_or(Error::ChannelClosed)?;
        core.call_remote(
            Target::Method(self.name().to_string()),
            &self.inner.metadata,
            args,
        )
        .await
    }

    /// Convenience for all-serializable calls.
    pub async fn call_values(&self, args: Vec<Value>) -> Result<Value> {
        self.call(args.into_iter().map(Arg::Value).collect()).await
    }

    pub(crate) fn shares_stub_with(&self, other: &RemoteMethod) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Wraps a user closure into the stored `LocalMethod` shape.
pub(crate) fn into_local_method<F, Fut>(f: F) -> LocalMethod
where
    F: Fn(Vec<Inbound>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<Value, Fault>> + Send + 'static,
{
    Arc::new(move |args| Box::pin(f(args)))
}

/// Wraps a callback function into a local method that forwards plain
/// values and resolves to `Null` (the nested Return is never consumed).
pub(crate) fn callback_method(callback: marshal::CallbackFn) -> LocalMethod {
    Arc::new(move |args: Vec<Inbound>| {
        let callback = Arc::clone(&callback);
        Box::pin(async move {
            let values = args.into_iter().map(Inbound::into_value).collect();
            callback(values);
            Ok(Value::Null)
        })
    })
}

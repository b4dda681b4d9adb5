//! # Method Metadata
//!
//! Per-method declaration of parameter marshalling roles, and the class
//! shapes that carry them for remote-class proxies. Metadata is declared
//! once, at registration time, and immutable thereafter.

use std::collections::HashMap;

/// How one argument position crosses the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamRole {
    /// Pass through the wire codec unchanged.
    Serializable,
    /// A function forwarded by reference; invocations travel back to the
    /// sender, fire-and-forget.
    Callback,
    /// A remote-class instance passed by reference, with identity
    /// preserved when it returns to its home side.
    RemoteObject,
    /// Carried like `Serializable`, but its buffer id is listed for the
    /// transport to move without copying.
    Transferable,
}

impl ParamRole {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Serializable => "serializable",
            Self::Callback => "callback",
            Self::RemoteObject => "remoteObject",
            Self::Transferable => "transferable",
        }
    }
}

/// The declared roles of a method's parameters, in order.
///
/// Positions beyond the declared list default to `Serializable`.
#[derive(Debug, Clone)]
pub struct MethodMetadata {
    name: String,
    roles: Vec<ParamRole>,
}

impl MethodMetadata {
    /// Metadata with no declared roles: every position serializable.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            roles: Vec::new(),
        }
    }

    pub fn with_roles(name: impl Into<String>, roles: impl Into<Vec<ParamRole>>) -> Self {
        Self {
            name: name.into(),
            roles: roles.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The role of argument position `index`.
    pub fn role(&self, index: usize) -> ParamRole {
        self.roles
            .get(index)
            .copied()
            .unwrap_or(ParamRole::Serializable)
    }
}

/// The caller-side declaration of a remote class: its id, constructor
/// parameter roles, and the instance methods its proxy exposes.
///
/// The proxy built from a shape dispatches exactly the declared methods;
/// undeclared methods can still be invoked by name with default roles.
#[derive(Debug, Clone)]
pub struct ClassShape {
    class_id: String,
    ctor_roles: Vec<ParamRole>,
    methods: HashMap<String, MethodMetadata>,
}

impl ClassShape {
    pub fn new(class_id: impl Into<String>) -> Self {
        Self {
            class_id: class_id.into(),
            ctor_roles: Vec::new(),
            methods: HashMap::new(),
        }
    }

    pub fn ctor_roles(mut self, roles: impl Into<Vec<ParamRole>>) -> Self {
        self.ctor_roles = roles.into();
        self
    }

    /// Declares an instance method with default (all-serializable) roles.
    pub fn method(self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.method_with(name.clone(), Vec::new())
    }

    /// Declares an instance method with explicit parameter roles.
    pub fn method_with(mut self, name: impl Into<String>, roles: impl Into<Vec<ParamRole>>) -> Self {
        let name = name.into();
        self.methods
            .insert(name.clone(), MethodMetadata::with_roles(name, roles));
        self
    }

    pub fn class_id(&self) -> &str {
        &self.class_id
    }

    pub(crate) fn ctor_metadata(&self) -> MethodMetadata {
        MethodMetadata::with_roles("constructor", self.ctor_roles.clone())
    }

    pub(crate) fn method_metadata(&self, name: &str) -> Option<&MethodMetadata> {
        self.methods.get(name)
    }
}

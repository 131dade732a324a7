//! Capability identities and providers.
//!
//! A capability is an externally resolved dependency (a "service") identified
//! by its Rust type. Service fields and mutation procedures both resolve their
//! dependencies through a [`CapabilityProvider`].

use std::{
    any::{Any, TypeId},
    fmt,
    hash::{Hash, Hasher},
};

use rustc_hash::FxHashMap;

use crate::Shared;

/// A type-erased capability instance.
pub type Instance = Shared<dyn Any + Send + Sync>;

/// Identity of a capability type.
#[derive(Clone, Copy)]
pub struct Capability {
    type_id: TypeId,
    name: &'static str,
}

impl Capability {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Full type name, e.g. `my_app::RatingService`.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Last path segment of the type name.
    pub fn short_name(&self) -> &'static str {
        self.name.rsplit("::").next().unwrap_or(self.name)
    }

    pub fn matches(&self, instance: &Instance) -> bool {
        (**instance).type_id() == self.type_id
    }
}

impl PartialEq for Capability {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for Capability {}

impl Hash for Capability {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// Resolves capability instances by type.
pub trait CapabilityProvider: Send + Sync {
    fn resolve(&self, capability: &Capability) -> Option<Instance>;
}

/// Provider that resolves nothing. Used for pure (stage 1) execution.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCapabilities;

impl CapabilityProvider for NoCapabilities {
    fn resolve(&self, _capability: &Capability) -> Option<Instance> {
        None
    }
}

/// Map-backed [`CapabilityProvider`].
#[derive(Clone, Default)]
pub struct Capabilities {
    entries: FxHashMap<TypeId, Instance>,
}

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: Send + Sync + 'static>(&mut self, value: T) -> &mut Self {
        self.register_shared(Shared::new(value))
    }

    pub fn register_shared<T: Send + Sync + 'static>(&mut self, value: Shared<T>) -> &mut Self {
        self.entries.insert(TypeId::of::<T>(), value);
        self
    }

    pub fn with<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        self.register(value);
        self
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Shared<T>> {
        self.entries
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|instance| instance.downcast::<T>().ok())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CapabilityProvider for Capabilities {
    fn resolve(&self, capability: &Capability) -> Option<Instance> {
        self.entries.get(&capability.type_id()).cloned()
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capabilities").field("len", &self.entries.len()).finish()
    }
}

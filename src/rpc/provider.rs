//! Handler and middleware instance resolution.
//!
//! The engine never constructs handlers itself. It asks an
//! [`InstanceProvider`] for one per dispatch, keyed by type. Applications
//! with a DI container implement the trait over it; everyone else uses
//! [`InstanceRegistry`].

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::types::TypeInfo;
use crate::error::ResolveError;

/// Supplies handler and middleware instances by type.
pub trait InstanceProvider: Send + Sync {
    /// Obtain an instance of `ty`.
    ///
    /// The returned value must downcast to the concrete type `ty` names.
    fn resolve(&self, ty: TypeInfo) -> Result<Arc<dyn Any + Send + Sync>, ResolveError>;
}

type Factory = Box<dyn Fn() -> Arc<dyn Any + Send + Sync> + Send + Sync>;

enum Registration {
    Singleton(Arc<dyn Any + Send + Sync>),
    Factory(Factory),
}

/// Type-keyed instance registry.
///
/// A singleton is shared by every resolve; a factory builds a fresh instance
/// per resolve, which for handlers means one per request.
#[derive(Default)]
pub struct InstanceRegistry {
    entries: HashMap<TypeId, (TypeInfo, Registration)>,
}

impl InstanceRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a shared instance. Replaces any earlier registration of `T`.
    pub fn singleton<T: Any + Send + Sync>(mut self, instance: Arc<T>) -> Self {
        self.insert::<T>(Registration::Singleton(instance));
        self
    }

    /// Register a constructor called on every resolve of `T`.
    pub fn factory<T, F>(mut self, factory: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.insert::<T>(Registration::Factory(Box::new(move || {
            Arc::new(factory()) as Arc<dyn Any + Send + Sync>
        })));
        self
    }

    fn insert<T: Any>(&mut self, registration: Registration) {
        let ty = TypeInfo::of::<T>();
        if self.entries.insert(ty.id(), (ty, registration)).is_some() {
            tracing::debug!(instance = %ty, "replaced instance registration");
        }
    }

    /// Whether `T` has a singleton or factory registered.
    pub fn contains<T: Any>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<T>())
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve and downcast in one step.
    pub fn resolve_typed<T: Any + Send + Sync>(&self) -> Result<Arc<T>, ResolveError> {
        self.resolve(TypeInfo::of::<T>())?
            .downcast::<T>()
            .map_err(|_| ResolveError::TypeMismatch {
                type_name: std::any::type_name::<T>(),
            })
    }
}

impl InstanceProvider for InstanceRegistry {
    fn resolve(&self, ty: TypeInfo) -> Result<Arc<dyn Any + Send + Sync>, ResolveError> {
        match self.entries.get(&ty.id()) {
            Some((_, Registration::Singleton(instance))) => Ok(Arc::clone(instance)),
            Some((_, Registration::Factory(factory))) => Ok(factory()),
            None => Err(ResolveError::NotRegistered {
                type_name: ty.name(),
            }),
        }
    }
}

impl<P: InstanceProvider + ?Sized> InstanceProvider for Arc<P> {
    fn resolve(&self, ty: TypeInfo) -> Result<Arc<dyn Any + Send + Sync>, ResolveError> {
        (**self).resolve(ty)
    }
}

impl fmt::Debug for InstanceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.values().map(|(ty, registration)| {
                let kind = match registration {
                    Registration::Singleton(_) => "singleton",
                    Registration::Factory(_) => "factory",
                };
                (ty.short_name(), kind)
            }))
            .finish()
    }
}

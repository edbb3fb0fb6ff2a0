//! Handler registry for dispatching requests by request type.
//!
//! The registry is built once from scanned descriptors and is read-only
//! afterwards; concurrent dispatches share it without locking.
//!
//! # Example
//!
//! ```ignore
//! let registry = HandlerRegistry::build(
//!     MetadataScanner::new().candidate::<PingHandler>().scan()?,
//! )?;
//!
//! let descriptor = registry.lookup_type::<Ping>().expect("bound");
//! assert_eq!(descriptor.qualified_name(), "PingHandler::ping");
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::descriptor::HandlerDescriptor;
use crate::error::{BuildError, Result};

/// Descriptors indexed by request type.
#[derive(Default)]
pub struct HandlerRegistry {
    /// Descriptors sorted by request type name, for enumeration.
    ordered: Vec<Arc<HandlerDescriptor>>,
    /// Request `TypeId` to descriptor, for dispatch.
    by_request: HashMap<TypeId, Arc<HandlerDescriptor>>,
}

impl HandlerRegistry {
    /// Index descriptors, rejecting two bound to the same request type.
    ///
    /// Descriptors may come from several scanners, so uniqueness is checked
    /// again here.
    pub fn build(descriptors: Vec<HandlerDescriptor>) -> Result<Self> {
        let mut by_request: HashMap<TypeId, Arc<HandlerDescriptor>> =
            HashMap::with_capacity(descriptors.len());

        for descriptor in descriptors {
            let key = descriptor.request().id();
            if let Some(existing) = by_request.get(&key) {
                return Err(BuildError::DuplicateBinding {
                    request: descriptor.request().short_name(),
                    first: existing.qualified_name(),
                    second: descriptor.qualified_name(),
                });
            }
            by_request.insert(key, Arc::new(descriptor));
        }

        let mut ordered: Vec<_> = by_request.values().cloned().collect();
        ordered.sort_by(|a, b| a.request().name().cmp(b.request().name()));

        Ok(Self {
            ordered,
            by_request,
        })
    }

    /// Descriptor for a request type, if one is bound.
    pub fn lookup(&self, request: TypeId) -> Option<&Arc<HandlerDescriptor>> {
        self.by_request.get(&request)
    }

    /// Typed form of [`lookup`](Self::lookup).
    pub fn lookup_type<Req: Any>(&self) -> Option<&Arc<HandlerDescriptor>> {
        self.lookup(TypeId::of::<Req>())
    }

    /// Whether `Req` has a bound handler.
    pub fn contains<Req: Any>(&self) -> bool {
        self.by_request.contains_key(&TypeId::of::<Req>())
    }

    /// Descriptors ordered by request type name.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<HandlerDescriptor>> {
        self.ordered.iter()
    }

    /// Short request type names, in enumeration order.
    pub fn request_names(&self) -> Vec<&'static str> {
        self.ordered.iter().map(|d| d.request().short_name()).collect()
    }

    /// Number of bound request types.
    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.ordered.iter().map(|d| d.qualified_name()).collect::<Vec<_>>())
            .finish()
    }
}

//! Runtime type identity for request, response, parameter and handler types.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};

/// A type's identity plus its name for diagnostics.
///
/// Equality and hashing only look at the `TypeId`.
#[derive(Clone, Copy)]
pub struct TypeInfo {
    id: TypeId,
    name: &'static str,
}

impl TypeInfo {
    /// Identity of `T`.
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Runtime type identity; the key every lookup uses.
    #[inline]
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Fully qualified type name.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Type name without its module path, e.g. `Pong` or `RpcResult<feedcore::Pong>`.
    pub fn short_name(&self) -> &'static str {
        short_type_name(self.name)
    }

    /// Whether this describes `T`.
    #[inline]
    pub fn is<T: ?Sized + 'static>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }
}

impl PartialEq for TypeInfo {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeInfo {}

impl Hash for TypeInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// Strip the module path from a `std::any::type_name` string.
///
/// Only the outermost path is stripped; generic arguments are kept verbatim.
pub fn short_type_name(full: &'static str) -> &'static str {
    let head_end = full.find('<').unwrap_or(full.len());
    match full[..head_end].rfind("::") {
        Some(idx) => &full[idx + 2..],
        None => full,
    }
}

/// A request value with its static type erased.
///
/// This is what the dispatch engine routes on: the descriptor is looked up by
/// the payload's runtime type.
pub struct RequestPayload {
    value: Box<dyn Any + Send>,
    type_info: TypeInfo,
}

impl RequestPayload {
    pub fn new<T: Any + Send>(value: T) -> Self {
        Self {
            value: Box::new(value),
            type_info: TypeInfo::of::<T>(),
        }
    }

    /// Runtime type of the wrapped request.
    #[inline]
    pub fn type_info(&self) -> TypeInfo {
        self.type_info
    }

    /// Whether the payload holds a `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.value.is::<T>()
    }

    /// Borrow the value as `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Take the request back out; returns the payload unchanged on a type mismatch.
    pub fn downcast<T: Any>(self) -> Result<T, Self> {
        let type_info = self.type_info;
        match self.value.downcast::<T>() {
            Ok(value) => Ok(*value),
            Err(value) => Err(Self { value, type_info }),
        }
    }
}

impl fmt::Debug for RequestPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestPayload")
            .field("type", &self.type_info)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Ping;

    #[test]
    fn test_short_type_name() {
        assert_eq!(short_type_name("feedcore::rpc::Ping"), "Ping");
        assert_eq!(short_type_name("u32"), "u32");
        assert_eq!(
            short_type_name("feedcore::rpc::result::RpcResult<feedcore::Pong>"),
            "RpcResult<feedcore::Pong>"
        );
    }

    #[test]
    fn test_type_info_equality_ignores_name() {
        assert_eq!(TypeInfo::of::<Ping>(), TypeInfo::of::<Ping>());
        assert_ne!(TypeInfo::of::<Ping>(), TypeInfo::of::<u32>());
        assert!(TypeInfo::of::<Ping>().is::<Ping>());
        assert_eq!(TypeInfo::of::<Ping>().short_name(), "Ping");
    }

    #[test]
    fn test_payload_downcast() {
        let payload = RequestPayload::new(41u32);
        assert!(payload.type_info().is::<u32>());
        assert_eq!(payload.downcast_ref::<u32>(), Some(&41));

        let payload = payload.downcast::<String>().unwrap_err();
        assert_eq!(payload.downcast::<u32>().unwrap(), 41);
    }
}

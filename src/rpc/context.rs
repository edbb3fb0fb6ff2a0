//! Per-request invocation state threaded through the middleware chain.
//!
//! An [`InvocationContext`] is created for each dispatch and dropped once the
//! result has been normalized. Middleware can:
//!
//! - inspect the request (`request_ref`)
//! - read the handler's descriptor and markers
//! - supply extra handler arguments through [`Extensions`], read back by
//!   the handler's declared [`Params`]
//! - short-circuit by setting a response and not calling `next`
//!
//! # Example
//!
//! ```ignore
//! fn run<'a>(&'a self, ctx: &'a mut InvocationContext, next: Next<'a>) -> BoxFuture<'a, HandlerResult> {
//!     Box::pin(async move {
//!         ctx.extensions_mut().insert(CallerId(7));
//!         next.run(ctx).await
//!     })
//! }
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::descriptor::HandlerDescriptor;
use super::types::{RequestPayload, TypeInfo};
use crate::error::HandlerError;

/// Type-keyed side channel; holds at most one value per type.
#[derive(Clone, Default)]
pub struct Extensions {
    map: HashMap<TypeId, (TypeInfo, Arc<dyn Any + Send + Sync>)>,
}

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, returning whether one of the same type was replaced.
    pub fn insert<T: Any + Send + Sync>(&mut self, value: T) -> bool {
        self.map
            .insert(TypeId::of::<T>(), (TypeInfo::of::<T>(), Arc::new(value)))
            .is_some()
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with<T: Any + Send + Sync>(mut self, value: T) -> Self {
        self.insert(value);
        self
    }

    pub fn get<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|(_, value)| value.downcast_ref::<T>())
    }

    pub fn remove<T: Any + Send + Sync>(&mut self) -> bool {
        self.map.remove(&TypeId::of::<T>()).is_some()
    }

    pub fn contains<T: Any + Send + Sync>(&self) -> bool {
        self.map.contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// A shared handle to the value of type `T`.
    pub fn get_arc<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|(_, value)| Arc::clone(value).downcast::<T>().ok())
    }
}

impl fmt::Debug for Extensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set()
            .entries(self.map.values().map(|(ty, _)| ty.short_name()))
            .finish()
    }
}

/// The value a handler (or a short-circuiting middleware) produced.
pub struct ResponseValue {
    value: Box<dyn Any + Send>,
    type_info: TypeInfo,
}

impl ResponseValue {
    pub fn new<T: Any + Send>(value: T) -> Self {
        Self {
            value: Box::new(value),
            type_info: TypeInfo::of::<T>(),
        }
    }

    pub fn type_info(&self) -> TypeInfo {
        self.type_info
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Take the value out; returns it unchanged on a type mismatch.
    pub fn downcast<T: Any>(self) -> Result<T, Self> {
        let type_info = self.type_info;
        match self.value.downcast::<T>() {
            Ok(value) => Ok(*value),
            Err(value) => Err(Self { value, type_info }),
        }
    }
}

impl fmt::Debug for ResponseValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseValue")
            .field("type", &self.type_info)
            .finish_non_exhaustive()
    }
}

/// Mutable state for one in-flight request.
pub struct InvocationContext {
    request: Option<RequestPayload>,
    request_type: TypeInfo,
    descriptor: Arc<HandlerDescriptor>,
    extensions: Extensions,
    response: Option<ResponseValue>,
}

impl InvocationContext {
    pub(crate) fn new(
        request: RequestPayload,
        descriptor: Arc<HandlerDescriptor>,
        extensions: Extensions,
    ) -> Self {
        Self {
            request_type: request.type_info(),
            request: Some(request),
            descriptor,
            extensions,
            response: None,
        }
    }

    /// The request payload; `None` once the handler has taken it.
    pub fn request(&self) -> Option<&RequestPayload> {
        self.request.as_ref()
    }

    pub fn request_ref<T: Any>(&self) -> Option<&T> {
        self.request.as_ref().and_then(|r| r.downcast_ref::<T>())
    }

    pub fn request_type(&self) -> TypeInfo {
        self.request_type
    }

    pub fn descriptor(&self) -> &Arc<HandlerDescriptor> {
        &self.descriptor
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    /// Set the response. A middleware that does this without calling `next`
    /// short-circuits the handler.
    pub fn set_response<T: Any + Send>(&mut self, value: T) {
        self.response = Some(ResponseValue::new(value));
    }

    pub fn has_response(&self) -> bool {
        self.response.is_some()
    }

    pub fn response_type(&self) -> Option<TypeInfo> {
        self.response.as_ref().map(ResponseValue::type_info)
    }

    pub fn response_ref<T: Any>(&self) -> Option<&T> {
        self.response.as_ref().and_then(|r| r.downcast_ref::<T>())
    }

    pub(crate) fn set_response_value(&mut self, value: ResponseValue) {
        self.response = Some(value);
    }

    pub(crate) fn take_request(&mut self) -> Option<RequestPayload> {
        self.request.take()
    }

    pub(crate) fn take_response(&mut self) -> Option<ResponseValue> {
        self.response.take()
    }
}

impl fmt::Debug for InvocationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationContext")
            .field("request_type", &self.request_type)
            .field("handler", &self.descriptor.qualified_name())
            .field("extensions", &self.extensions)
            .field("response", &self.response)
            .finish()
    }
}

/// One extra handler argument, read from the context's [`Extensions`].
///
/// `Arc<T>` requires a value and fails the request with `MissingParameter`
/// when no middleware supplied one; `Option<Arc<T>>` tolerates its absence.
pub trait Param: Sized + Send + 'static {
    /// The type looked up in the side channel.
    fn type_info() -> TypeInfo;

    fn from_extensions(extensions: &Extensions) -> Result<Self, HandlerError>;
}

impl<T: Any + Send + Sync> Param for Arc<T> {
    fn type_info() -> TypeInfo {
        TypeInfo::of::<T>()
    }

    fn from_extensions(extensions: &Extensions) -> Result<Self, HandlerError> {
        extensions
            .get_arc::<T>()
            .ok_or_else(|| HandlerError::missing_parameter(TypeInfo::of::<T>()))
    }
}

impl<T: Any + Send + Sync> Param for Option<Arc<T>> {
    fn type_info() -> TypeInfo {
        TypeInfo::of::<T>()
    }

    fn from_extensions(extensions: &Extensions) -> Result<Self, HandlerError> {
        Ok(extensions.get_arc::<T>())
    }
}

/// The extra parameters of a handler method, as a tuple of [`Param`]s.
///
/// The tuple type is the declaration: the scanner validates
/// [`types`](Params::types) and the innermost link extracts exactly those
/// values, so a handler body has no way to reach anything else in the
/// side channel.
pub trait Params: Sized + Send + 'static {
    /// Declared parameter types, in tuple order.
    fn types() -> Vec<TypeInfo>;

    fn extract(extensions: &Extensions) -> Result<Self, HandlerError>;
}

impl Params for () {
    fn types() -> Vec<TypeInfo> {
        Vec::new()
    }

    fn extract(_extensions: &Extensions) -> Result<Self, HandlerError> {
        Ok(())
    }
}

macro_rules! impl_params {
    ($($p:ident),+) => {
        impl<$($p: Param),+> Params for ($($p,)+) {
            fn types() -> Vec<TypeInfo> {
                vec![$($p::type_info()),+]
            }

            fn extract(extensions: &Extensions) -> Result<Self, HandlerError> {
                Ok(($($p::from_extensions(extensions)?,)+))
            }
        }
    };
}

impl_params!(A);
impl_params!(A, B);
impl_params!(A, B, C);
impl_params!(A, B, C, D);

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct CallerId(u32);

    #[derive(Debug, PartialEq)]
    struct Locale(&'static str);

    #[test]
    fn test_extensions_one_value_per_type() {
        let mut ext = Extensions::new();
        assert!(!ext.insert(CallerId(1)));
        assert!(ext.insert(CallerId(2)));

        assert_eq!(ext.len(), 1);
        assert_eq!(ext.get::<CallerId>(), Some(&CallerId(2)));
        assert!(ext.remove::<CallerId>());
        assert!(ext.is_empty());
    }

    #[test]
    fn test_params_read_only_declared_types() {
        let ext = Extensions::new().with(CallerId(7)).with(Locale("en"));

        assert_eq!(<(Arc<CallerId>,)>::types(), vec![TypeInfo::of::<CallerId>()]);
        let (caller,) = <(Arc<CallerId>,)>::extract(&ext).unwrap();
        assert_eq!(*caller, CallerId(7));

        let (caller, locale) = <(Arc<CallerId>, Option<Arc<Locale>>)>::extract(&ext).unwrap();
        assert_eq!(caller.0, 7);
        assert_eq!(locale.as_deref(), Some(&Locale("en")));
        assert!(<()>::types().is_empty());
    }

    #[test]
    fn test_params_missing_value() {
        let ext = Extensions::new();

        let err = <(Arc<Locale>,)>::extract(&ext).unwrap_err();
        assert_eq!(err.kind(), "MissingParameter");

        let (locale,) = <(Option<Arc<Locale>>,)>::extract(&ext).unwrap();
        assert!(locale.is_none());
        assert_eq!(<(Option<Arc<Locale>>,)>::types(), vec![TypeInfo::of::<Locale>()]);
    }

    #[test]
    fn test_response_value_downcast() {
        let value = ResponseValue::new(String::from("pong"));
        assert!(value.type_info().is::<String>());

        let value = value.downcast::<u32>().unwrap_err();
        assert_eq!(value.downcast::<String>().unwrap(), "pong");
    }
}

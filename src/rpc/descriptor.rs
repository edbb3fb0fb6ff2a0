//! Immutable metadata for one bound handler method.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use super::context::{Extensions, ResponseValue};
use super::markers::Markers;
use super::types::{RequestPayload, TypeInfo};
use crate::error::HandlerError;
use crate::BoxFuture;

/// Compiled call into a handler method.
///
/// Built once when the method is bound; takes the resolved handler instance,
/// the request payload and the side channel its declared parameters are
/// extracted from.
pub(crate) type Invoker = Box<
    dyn Fn(
            Arc<dyn Any + Send + Sync>,
            RequestPayload,
            &Extensions,
        ) -> BoxFuture<'static, Result<ResponseValue, HandlerError>>
        + Send
        + Sync,
>;

/// What a handler method produces once its future resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnShape {
    /// `()`: normalized to a success carrying the default response.
    Unit,
    /// The response type itself: wrapped as a success.
    Response,
    /// `RpcResult<Response>`: passed through unchanged.
    ResultWrapped,
}

impl ReturnShape {
    /// Match a handler's output type against the allowed shapes.
    pub(crate) fn resolve(output: TypeInfo, response: TypeInfo, wrapped: TypeInfo) -> Option<Self> {
        if output == response {
            Some(Self::Response)
        } else if output == wrapped {
            Some(Self::ResultWrapped)
        } else if output.is::<()>() {
            Some(Self::Unit)
        } else {
            None
        }
    }
}

/// Descriptor of one bound handler method.
///
/// Held in the [`HandlerRegistry`](super::HandlerRegistry) for the life of the
/// process and shared by every dispatch of its request type.
pub struct HandlerDescriptor {
    pub(crate) handler: TypeInfo,
    pub(crate) method: &'static str,
    pub(crate) request: TypeInfo,
    pub(crate) response: TypeInfo,
    pub(crate) markers: Markers,
    pub(crate) params: Vec<TypeInfo>,
    pub(crate) return_shape: ReturnShape,
    pub(crate) invoker: Invoker,
    pub(crate) default_response: fn() -> ResponseValue,
}

impl HandlerDescriptor {
    /// Owning handler type.
    pub fn handler(&self) -> TypeInfo {
        self.handler
    }

    /// Method name as bound.
    pub fn method(&self) -> &'static str {
        self.method
    }

    /// Request type; unique across a registry.
    pub fn request(&self) -> TypeInfo {
        self.request
    }

    /// Declared response type.
    pub fn response(&self) -> TypeInfo {
        self.response
    }

    /// Class-level markers merged with method-level ones.
    pub fn markers(&self) -> &Markers {
        &self.markers
    }

    /// Look up one marker by type.
    pub fn marker<M: Any + Send + Sync>(&self) -> Option<&M> {
        self.markers.get::<M>()
    }

    /// Declared extra parameter types, in declaration order.
    pub fn params(&self) -> &[TypeInfo] {
        &self.params
    }

    /// Whether `T` is one of the declared extra parameters.
    pub fn accepts_param<T: Any>(&self) -> bool {
        self.params.iter().any(|p| p.is::<T>())
    }

    /// How the handler's output is normalized.
    pub fn return_shape(&self) -> ReturnShape {
        self.return_shape
    }

    /// `Handler::method`, used in diagnostics and error reports.
    pub fn qualified_name(&self) -> String {
        format!("{}::{}", self.handler.short_name(), self.method)
    }

    pub(crate) fn invoke(
        &self,
        instance: Arc<dyn Any + Send + Sync>,
        request: RequestPayload,
        extensions: &Extensions,
    ) -> BoxFuture<'static, Result<ResponseValue, HandlerError>> {
        (self.invoker)(instance, request, extensions)
    }

    pub(crate) fn default_response(&self) -> ResponseValue {
        (self.default_response)()
    }
}

impl fmt::Debug for HandlerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerDescriptor")
            .field("handler", &self.handler)
            .field("method", &self.method)
            .field("request", &self.request)
            .field("response", &self.response)
            .field("markers", &self.markers)
            .field("params", &self.params)
            .field("return_shape", &self.return_shape)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::RpcResult;

    struct Pong;

    #[test]
    fn test_return_shape_resolution() {
        let response = TypeInfo::of::<Pong>();
        let wrapped = TypeInfo::of::<RpcResult<Pong>>();

        assert_eq!(
            ReturnShape::resolve(TypeInfo::of::<Pong>(), response, wrapped),
            Some(ReturnShape::Response)
        );
        assert_eq!(
            ReturnShape::resolve(wrapped, response, wrapped),
            Some(ReturnShape::ResultWrapped)
        );
        assert_eq!(
            ReturnShape::resolve(TypeInfo::of::<()>(), response, wrapped),
            Some(ReturnShape::Unit)
        );
        assert_eq!(
            ReturnShape::resolve(TypeInfo::of::<String>(), response, wrapped),
            None
        );
        assert_eq!(
            ReturnShape::resolve(TypeInfo::of::<RpcResult<String>>(), response, wrapped),
            None
        );
    }

    #[test]
    fn test_unit_response_is_response_shape() {
        let unit = TypeInfo::of::<()>();
        assert_eq!(
            ReturnShape::resolve(unit, unit, TypeInfo::of::<RpcResult<()>>()),
            Some(ReturnShape::Response)
        );
    }
}

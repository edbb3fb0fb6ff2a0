//! Handler binding and build-time validation.
//!
//! Handlers are ordinary types implementing [`RpcHandler`]. Each one lists
//! its bound methods in [`RpcHandler::bind`]; the [`MetadataScanner`] collects
//! those bindings from every candidate type, validates them and produces the
//! immutable [`HandlerDescriptor`]s the dispatch engine routes on.
//!
//! Every violation is a [`BuildError`]: an engine is never built from invalid
//! bindings, so dispatch itself does no validity checks.
//!
//! # Example
//!
//! ```ignore
//! struct FeedHandler { store: FeedStore }
//!
//! impl FeedHandler {
//!     async fn fetch(
//!         self: Arc<Self>,
//!         req: FetchFeed,
//!         (caller,): (Arc<CallerId>,),
//!     ) -> Result<FeedPage, HandlerError> {
//!         Ok(self.store.page(&caller, &req.url).await?)
//!     }
//! }
//!
//! impl RpcHandler for FeedHandler {
//!     fn bind(methods: &mut MethodSet<Self>) {
//!         methods
//!             .bind::<FetchFeed, FeedPage>("fetch")
//!             .handle_with(Self::fetch);
//!     }
//! }
//!
//! let descriptors = MetadataScanner::new()
//!     .allow_param::<CallerId>()
//!     .candidate::<FeedHandler>()
//!     .scan()?;
//! ```

use std::any::Any;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use super::context::{Extensions, Params, ResponseValue};
use super::descriptor::{HandlerDescriptor, Invoker, ReturnShape};
use super::markers::Markers;
use super::result::RpcResult;
use super::types::{RequestPayload, TypeInfo};
use crate::error::{BuildError, HandlerError, ResolveError, Result};
use crate::BoxFuture;

/// A type whose methods can be bound as RPC handlers.
///
/// Instances are obtained per dispatch from the engine's
/// [`InstanceProvider`](super::InstanceProvider).
pub trait RpcHandler: Send + Sync + Sized + 'static {
    /// Markers applied to every method of this handler.
    fn markers() -> Markers {
        Markers::new()
    }

    /// Bind this handler's methods.
    fn bind(methods: &mut MethodSet<Self>);
}

/// A method bound but not yet validated.
pub(crate) struct PendingMethod {
    method: &'static str,
    request: TypeInfo,
    response: TypeInfo,
    result_wrapper: TypeInfo,
    output: TypeInfo,
    params: Vec<TypeInfo>,
    markers: Markers,
    invoker: Invoker,
    default_response: fn() -> ResponseValue,
}

/// Bound methods of one handler type.
pub struct MethodSet<H> {
    methods: Vec<PendingMethod>,
    _handler: PhantomData<fn() -> H>,
}

impl<H: RpcHandler> MethodSet<H> {
    fn new() -> Self {
        Self {
            methods: Vec::new(),
            _handler: PhantomData,
        }
    }

    /// Start binding a method that serves `Req` and responds with `Resp`.
    ///
    /// Nothing is registered until [`MethodBinding::handle`] is called.
    pub fn bind<Req, Resp>(&mut self, name: &'static str) -> MethodBinding<'_, H, Req, Resp>
    where
        Req: Any + Send,
        Resp: Any + Send + Default,
    {
        MethodBinding {
            set: self,
            name,
            markers: Markers::new(),
            _types: PhantomData,
        }
    }

    /// Number of methods bound so far.
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

/// Builder for one bound method.
#[must_use = "a method binding does nothing until `handle` is called"]
pub struct MethodBinding<'s, H, Req, Resp> {
    set: &'s mut MethodSet<H>,
    name: &'static str,
    markers: Markers,
    _types: PhantomData<fn(Req) -> Resp>,
}

impl<'s, H, Req, Resp> MethodBinding<'s, H, Req, Resp>
where
    H: RpcHandler,
    Req: Any + Send,
    Resp: Any + Send + Default,
{
    /// Attach a method-level marker.
    pub fn marker<M: Any + Send + Sync>(mut self, marker: M) -> Self {
        self.markers.insert(marker);
        self
    }

    /// Register a method body that takes no extra parameters.
    ///
    /// `Out` decides the return shape and must be `()`, `Resp` or
    /// `RpcResult<Resp>`; anything else fails the scan.
    pub fn handle<F, Fut, Out>(self, f: F)
    where
        F: Fn(Arc<H>, Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Out, HandlerError>> + Send + 'static,
        Out: Any + Send,
    {
        self.handle_with(move |handler: Arc<H>, request: Req, (): ()| f(handler, request));
    }

    /// Register a method body with extra parameters.
    ///
    /// The third argument is a tuple of [`Param`](super::Param)s such as
    /// `(Arc<CallerId>, Option<Arc<Locale>>)`. Its element types are the
    /// declared parameters: the scanner checks them against the allowed set
    /// and only their values are read from the context.
    pub fn handle_with<F, Fut, Out, P>(self, f: F)
    where
        F: Fn(Arc<H>, Req, P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Out, HandlerError>> + Send + 'static,
        Out: Any + Send,
        P: Params,
    {
        let invoker: Invoker = Box::new(
            move |instance: Arc<dyn Any + Send + Sync>,
                  request: RequestPayload,
                  extensions: &Extensions|
                  -> BoxFuture<'static, std::result::Result<ResponseValue, HandlerError>> {
                let handler = match instance.downcast::<H>() {
                    Ok(handler) => handler,
                    Err(_) => {
                        let err = ResolveError::TypeMismatch {
                            type_name: std::any::type_name::<H>(),
                        };
                        return Box::pin(async move { Err(HandlerError::from(err)) });
                    }
                };
                let request = match request.downcast::<Req>() {
                    Ok(request) => request,
                    Err(payload) => {
                        let err = request_mismatch::<Req>(&payload);
                        return Box::pin(async move { Err(err) });
                    }
                };
                let params = match P::extract(extensions) {
                    Ok(params) => params,
                    Err(err) => return Box::pin(async move { Err(err) }),
                };

                let fut = f(handler, request, params);
                Box::pin(async move { fut.await.map(ResponseValue::new) })
            },
        );

        self.set.methods.push(PendingMethod {
            method: self.name,
            request: TypeInfo::of::<Req>(),
            response: TypeInfo::of::<Resp>(),
            result_wrapper: TypeInfo::of::<RpcResult<Resp>>(),
            output: TypeInfo::of::<Out>(),
            params: P::types(),
            markers: self.markers,
            invoker,
            default_response: default_response::<Resp>,
        });
    }
}

fn default_response<Resp: Any + Send + Default>() -> ResponseValue {
    ResponseValue::new(Resp::default())
}

fn request_mismatch<Req>(payload: &RequestPayload) -> HandlerError {
    HandlerError::new(
        "RequestTypeMismatch",
        format!(
            "expected request {}, got {}",
            std::any::type_name::<Req>(),
            payload.type_info().name()
        ),
    )
}

struct Candidate {
    handler: TypeInfo,
    markers: Markers,
    methods: Vec<PendingMethod>,
}

/// Collects handler bindings and turns them into validated descriptors.
#[derive(Default)]
pub struct MetadataScanner {
    allowed_params: Vec<TypeInfo>,
    candidates: Vec<Candidate>,
}

impl MetadataScanner {
    /// Scanner with no candidates and an empty parameter whitelist.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow handlers to declare `T` as an extra parameter.
    pub fn allow_param<T: Any + Send + Sync>(mut self) -> Self {
        let ty = TypeInfo::of::<T>();
        if !self.allowed_params.contains(&ty) {
            self.allowed_params.push(ty);
        }
        self
    }

    /// Add a candidate handler type.
    pub fn candidate<H: RpcHandler>(mut self) -> Self {
        let mut set = MethodSet::<H>::new();
        H::bind(&mut set);
        self.candidates.push(Candidate {
            handler: TypeInfo::of::<H>(),
            markers: H::markers(),
            methods: set.methods,
        });
        self
    }

    /// Number of candidate types added so far.
    pub fn candidate_count(&self) -> usize {
        self.candidates.len()
    }

    /// Validate every bound method and build its descriptor.
    ///
    /// Fails on the first invalid binding; descriptors come back in scan order.
    pub fn scan(self) -> Result<Vec<HandlerDescriptor>> {
        let mut descriptors: Vec<HandlerDescriptor> = Vec::new();

        for candidate in self.candidates {
            for pending in candidate.methods {
                let descriptor = validate(
                    candidate.handler,
                    &candidate.markers,
                    pending,
                    &self.allowed_params,
                )?;

                if let Some(existing) = descriptors
                    .iter()
                    .find(|d| d.request == descriptor.request)
                {
                    return Err(BuildError::DuplicateBinding {
                        request: descriptor.request.short_name(),
                        first: existing.qualified_name(),
                        second: descriptor.qualified_name(),
                    });
                }

                tracing::debug!(
                    handler = %descriptor.qualified_name(),
                    request = %descriptor.request,
                    shape = ?descriptor.return_shape,
                    "bound rpc handler"
                );
                descriptors.push(descriptor);
            }
        }

        Ok(descriptors)
    }
}

fn validate(
    handler: TypeInfo,
    class_markers: &Markers,
    pending: PendingMethod,
    allowed: &[TypeInfo],
) -> Result<HandlerDescriptor> {
    if pending.method.trim().is_empty() {
        return Err(BuildError::EmptyMethodName {
            handler: handler.short_name(),
        });
    }
    let qualified = || format!("{}::{}", handler.short_name(), pending.method);

    let mut params: Vec<TypeInfo> = Vec::with_capacity(pending.params.len());
    for param in &pending.params {
        if *param != pending.request && !allowed.contains(param) {
            return Err(BuildError::DisallowedParameter {
                handler: qualified(),
                parameter: param.name(),
            });
        }
        if *param == pending.request || params.contains(param) {
            return Err(BuildError::DuplicateParameter {
                handler: qualified(),
                parameter: param.name(),
            });
        }
        params.push(*param);
    }

    let return_shape =
        ReturnShape::resolve(pending.output, pending.response, pending.result_wrapper).ok_or_else(
            || BuildError::UnsupportedReturnShape {
                handler: qualified(),
                found: pending.output.name(),
                response: pending.response.name(),
            },
        )?;

    Ok(HandlerDescriptor {
        handler,
        method: pending.method,
        request: pending.request,
        response: pending.response,
        markers: Markers::merge(class_markers, &pending.markers),
        params,
        return_shape,
        invoker: pending.invoker,
        default_response: pending.default_response,
    })
}

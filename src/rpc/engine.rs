//! Request dispatch.
//!
//! [`RpcEngine`] routes a request to the handler bound to its type, runs it
//! through the middleware chain and normalizes whatever comes back into an
//! [`RpcResult`]. `execute` never fails and never panics on behalf of a
//! handler: every outcome, including a handler panic, becomes an envelope.
//!
//! # Example
//!
//! ```ignore
//! let engine = RpcEngine::builder()
//!     .allow_param::<CallerId>()
//!     .candidate::<FeedHandler>()
//!     .middleware(Arc::new(Authenticate::new(tokens)))
//!     .instances(Arc::new(InstanceRegistry::new().singleton(Arc::new(feed_handler))))
//!     .build()?;
//!
//! let page: RpcResult<FeedPage> = engine.execute(FetchFeed { url }).await;
//! ```

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;

use super::context::{Extensions, InvocationContext, ResponseValue};
use super::descriptor::HandlerDescriptor;
use super::middleware::{Middleware, Next};
use super::provider::{InstanceProvider, InstanceRegistry};
use super::registry::HandlerRegistry;
use super::reporter::{ErrorReporter, ReportContext, TracingReporter};
use super::result::RpcResult;
use super::scanner::{MetadataScanner, RpcHandler};
use super::types::{RequestPayload, TypeInfo};
use crate::error::{BuildError, HandlerError, ResolveError, Result};

/// Dispatches requests to bound handlers.
///
/// Cheap to clone; clones share the registry, middleware and collaborators.
#[derive(Clone)]
pub struct RpcEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    registry: HandlerRegistry,
    middleware: Vec<Arc<dyn Middleware>>,
    instances: Arc<dyn InstanceProvider>,
    reporter: Arc<dyn ErrorReporter>,
}

impl RpcEngine {
    pub fn builder() -> RpcEngineBuilder {
        RpcEngineBuilder::default()
    }

    /// Descriptors this engine routes on.
    pub fn registry(&self) -> &HandlerRegistry {
        &self.inner.registry
    }

    /// Names of the middleware, outermost first.
    pub fn middleware_names(&self) -> Vec<&'static str> {
        self.inner.middleware.iter().map(|m| m.name()).collect()
    }

    /// Dispatch a typed request.
    pub async fn execute<Req, Resp>(&self, request: Req) -> RpcResult<Resp>
    where
        Req: Any + Send,
        Resp: Any + Send,
    {
        self.execute_payload(Some(RequestPayload::new(request)), Extensions::new())
            .await
    }

    /// Dispatch a typed request with pre-seeded context values, e.g. the
    /// caller identity a transport extracted.
    pub async fn execute_with<Req, Resp>(&self, request: Req, extensions: Extensions) -> RpcResult<Resp>
    where
        Req: Any + Send,
        Resp: Any + Send,
    {
        self.execute_payload(Some(RequestPayload::new(request)), extensions)
            .await
    }

    /// Dispatch an already type-erased request. `None` is a null payload.
    pub async fn execute_payload<Resp>(
        &self,
        request: Option<RequestPayload>,
        extensions: Extensions,
    ) -> RpcResult<Resp>
    where
        Resp: Any + Send,
    {
        let Some(request) = request else {
            return RpcResult::fail("request payload is null");
        };

        let request_type = request.type_info();
        let Some(descriptor) = self.inner.registry.lookup(request_type.id()).cloned() else {
            tracing::debug!(request = %request_type, "no rpc handler bound");
            return RpcResult::fail(format!(
                "no handler registered for request type {}",
                request_type.name()
            ));
        };

        let requested = TypeInfo::of::<Resp>();
        if descriptor.response() != requested {
            return RpcResult::fail(format!(
                "handler {} responds with {}, not {}",
                descriptor.qualified_name(),
                descriptor.response().name(),
                requested.name()
            ));
        }

        let mut ctx = InvocationContext::new(request, Arc::clone(&descriptor), extensions);
        let chain = Next::new(&self.inner.middleware, &*self.inner.instances);

        let outcome = match AssertUnwindSafe(chain.run(&mut ctx)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(HandlerError::from_panic(panic)),
        };

        if let Err(error) = outcome {
            return self.fail_reported(&descriptor, error);
        }

        normalize(&descriptor, ctx.take_response())
    }

    fn fail_reported<Resp>(&self, descriptor: &HandlerDescriptor, error: HandlerError) -> RpcResult<Resp> {
        let context = ReportContext::new(
            descriptor.qualified_name(),
            descriptor.request().short_name(),
            descriptor.markers(),
        );
        let report_id = self.inner.reporter.report(&error, &context);
        tracing::debug!(
            handler = %context.handler,
            report_id = %report_id,
            "rpc request failed"
        );
        RpcResult::fail(error.failure_message())
    }
}

/// Turn the response slot into an envelope.
///
/// Checked in order: a ready `RpcResult<Resp>`, a bare `Resp`, then `()`
/// which yields the descriptor's default response.
fn normalize<Resp: Any + Send>(descriptor: &HandlerDescriptor, slot: Option<ResponseValue>) -> RpcResult<Resp> {
    let Some(value) = slot else {
        return RpcResult::fail("response task is null");
    };

    let value = match value.downcast::<RpcResult<Resp>>() {
        Ok(result) => return result,
        Err(value) => value,
    };
    let value = match value.downcast::<Resp>() {
        Ok(payload) => return RpcResult::ok(payload),
        Err(value) => value,
    };

    if value.type_info().is::<()>() {
        if let Ok(payload) = descriptor.default_response().downcast::<Resp>() {
            return RpcResult::ok(payload);
        }
    }

    RpcResult::fail(format!(
        "unsupported response type {}",
        value.type_info().name()
    ))
}

impl fmt::Debug for RpcEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcEngine")
            .field("registry", &self.inner.registry)
            .field("middleware", &self.middleware_names())
            .finish_non_exhaustive()
    }
}

type ResolveMiddleware = fn(&dyn InstanceProvider) -> std::result::Result<Arc<dyn Middleware>, ResolveError>;

enum MiddlewareSource {
    Instance(Arc<dyn Middleware>),
    Provided {
        type_name: &'static str,
        resolve: ResolveMiddleware,
    },
}

fn resolve_middleware<M: Middleware>(
    instances: &dyn InstanceProvider,
) -> std::result::Result<Arc<dyn Middleware>, ResolveError> {
    let instance = instances.resolve(TypeInfo::of::<M>())?;
    let middleware = instance
        .downcast::<M>()
        .map_err(|_| ResolveError::TypeMismatch {
            type_name: std::any::type_name::<M>(),
        })?;
    Ok(middleware)
}

/// Builder for [`RpcEngine`].
#[derive(Default)]
pub struct RpcEngineBuilder {
    scanner: MetadataScanner,
    descriptors: Vec<HandlerDescriptor>,
    middleware: Vec<MiddlewareSource>,
    instances: Option<Arc<dyn InstanceProvider>>,
    reporter: Option<Arc<dyn ErrorReporter>>,
}

impl RpcEngineBuilder {
    /// Bind the methods of handler type `H`.
    pub fn candidate<H: RpcHandler>(mut self) -> Self {
        self.scanner = self.scanner.candidate::<H>();
        self
    }

    /// Allow handlers to declare `T` as an extra parameter.
    pub fn allow_param<T: Any + Send + Sync>(mut self) -> Self {
        self.scanner = self.scanner.allow_param::<T>();
        self
    }

    /// Add descriptors produced by a separate [`MetadataScanner`].
    pub fn descriptors(mut self, descriptors: Vec<HandlerDescriptor>) -> Self {
        self.descriptors.extend(descriptors);
        self
    }

    /// Append a middleware instance. Declaration order is execution order.
    pub fn middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(MiddlewareSource::Instance(middleware));
        self
    }

    /// Append a middleware obtained from the instance provider when the
    /// engine is built.
    pub fn middleware_from_provider<M: Middleware>(mut self) -> Self {
        self.middleware.push(MiddlewareSource::Provided {
            type_name: std::any::type_name::<M>(),
            resolve: resolve_middleware::<M>,
        });
        self
    }

    /// Where handler and middleware instances come from. Defaults to an
    /// empty [`InstanceRegistry`].
    pub fn instances(mut self, instances: Arc<dyn InstanceProvider>) -> Self {
        self.instances = Some(instances);
        self
    }

    /// Error sink for failed requests. Defaults to [`TracingReporter`].
    pub fn reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Validate all bindings and assemble the engine.
    pub fn build(self) -> Result<RpcEngine> {
        let mut descriptors = self.scanner.scan()?;
        descriptors.extend(self.descriptors);
        let registry = HandlerRegistry::build(descriptors)?;

        let instances = self
            .instances
            .unwrap_or_else(|| Arc::new(InstanceRegistry::new()));

        let mut middleware = Vec::with_capacity(self.middleware.len());
        for source in self.middleware {
            match source {
                MiddlewareSource::Instance(instance) => middleware.push(instance),
                MiddlewareSource::Provided { type_name, resolve } => {
                    let instance = resolve(&*instances).map_err(|source| {
                        BuildError::MiddlewareUnavailable {
                            middleware: type_name,
                            source,
                        }
                    })?;
                    middleware.push(instance);
                }
            }
        }

        tracing::debug!(
            handlers = registry.len(),
            middleware = middleware.len(),
            "rpc engine built"
        );

        Ok(RpcEngine {
            inner: Arc::new(EngineInner {
                registry,
                middleware,
                instances,
                reporter: self.reporter.unwrap_or_else(|| Arc::new(TracingReporter)),
            }),
        })
    }
}

//! In-process RPC dispatch.
//!
//! Requests are plain Rust values routed by their type:
//!
//! - [`RpcHandler`] types bind methods to request types
//! - [`MetadataScanner`] validates the bindings into [`HandlerDescriptor`]s
//! - [`HandlerRegistry`] indexes descriptors by request type
//! - [`Middleware`] wraps every invocation, onion style
//! - [`RpcEngine`] ties it together and returns an [`RpcResult`] envelope

pub mod context;
pub mod descriptor;
pub mod engine;
pub mod markers;
pub mod middleware;
pub mod provider;
pub mod registry;
pub mod reporter;
pub mod result;
pub mod scanner;
pub mod types;

pub use context::{Extensions, InvocationContext, Param, Params, ResponseValue};
pub use descriptor::{HandlerDescriptor, ReturnShape};
pub use engine::{RpcEngine, RpcEngineBuilder};
pub use markers::Markers;
pub use middleware::{HandlerResult, Middleware, Next};
pub use provider::{InstanceProvider, InstanceRegistry};
pub use registry::HandlerRegistry;
pub use reporter::{ErrorReporter, ReportContext, ReportId, TracingReporter};
pub use result::{Headers, RpcResult};
pub use scanner::{MetadataScanner, MethodBinding, MethodSet, RpcHandler};
pub use types::{RequestPayload, TypeInfo};

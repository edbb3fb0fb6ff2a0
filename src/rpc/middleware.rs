//! Middleware chain wrapped around every handler invocation.
//!
//! Middleware runs in declaration order on the way in and in reverse order on
//! the way out. Each link receives the context and a [`Next`] continuation:
//!
//! - call `next.run(ctx).await` to continue (work before and after is fine)
//! - set a response with `ctx.set_response(..)` and return without calling
//!   `next` to short-circuit the rest of the chain and the handler
//! - return an `Err` to fail the request; the engine reports it
//!
//! ```text
//! M1 ─► M2 ─► M3 ─► handler
//! M1 ◄─ M2 ◄─ M3 ◄─┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! struct RequireCaller;
//!
//! impl Middleware for RequireCaller {
//!     fn run<'a>(&'a self, ctx: &'a mut InvocationContext, next: Next<'a>) -> BoxFuture<'a, HandlerResult> {
//!         Box::pin(async move {
//!             if !ctx.extensions().contains::<CallerId>() {
//!                 ctx.set_response(RpcResult::<()>::fail("unauthenticated"));
//!                 return Ok(());
//!             }
//!             next.run(ctx).await
//!         })
//!     }
//! }
//! ```

use std::sync::Arc;

use super::context::InvocationContext;
use super::provider::InstanceProvider;
use super::types::short_type_name;
use crate::error::HandlerError;
use crate::BoxFuture;

/// Result type for middleware and the handler link.
pub type HandlerResult = Result<(), HandlerError>;

/// An interceptor around handler invocation.
pub trait Middleware: Send + Sync + 'static {
    /// Process the request, delegating to `next` unless short-circuiting.
    fn run<'a>(&'a self, ctx: &'a mut InvocationContext, next: Next<'a>) -> BoxFuture<'a, HandlerResult>;

    /// Name used in diagnostics.
    fn name(&self) -> &'static str {
        short_type_name(std::any::type_name::<Self>())
    }
}

/// The rest of the chain, ending in the handler call.
pub struct Next<'a> {
    remaining: &'a [Arc<dyn Middleware>],
    instances: &'a dyn InstanceProvider,
}

impl<'a> Next<'a> {
    pub(crate) fn new(chain: &'a [Arc<dyn Middleware>], instances: &'a dyn InstanceProvider) -> Self {
        Self {
            remaining: chain,
            instances,
        }
    }

    /// Number of middleware links still ahead of the handler.
    pub fn remaining(&self) -> usize {
        self.remaining.len()
    }

    /// Run the next link, or the handler once the chain is exhausted.
    pub fn run<'b>(self, ctx: &'b mut InvocationContext) -> BoxFuture<'b, HandlerResult>
    where
        'a: 'b,
    {
        match self.remaining.split_first() {
            Some((current, rest)) => {
                tracing::trace!(middleware = current.name(), "entering middleware");
                current.run(
                    ctx,
                    Next {
                        remaining: rest,
                        instances: self.instances,
                    },
                )
            }
            None => invoke_handler(ctx, self.instances),
        }
    }
}

/// Innermost link: resolve the handler, call it, store its output.
fn invoke_handler<'b>(
    ctx: &'b mut InvocationContext,
    instances: &'b dyn InstanceProvider,
) -> BoxFuture<'b, HandlerResult> {
    Box::pin(call_handler(ctx, instances))
}

async fn call_handler(ctx: &mut InvocationContext, instances: &dyn InstanceProvider) -> HandlerResult {
    let descriptor = Arc::clone(ctx.descriptor());
    let instance = instances.resolve(descriptor.handler())?;
    let request = ctx
        .take_request()
        .ok_or_else(|| HandlerError::new("RequestConsumed", "request payload was already taken"))?;

    let response = descriptor
        .invoke(instance, request, ctx.extensions())
        .await?;
    ctx.set_response_value(response);
    Ok(())
}

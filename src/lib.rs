//! # feedcore
//!
//! Shared infrastructure for the feed service backend.
//!
//! ## Subsystems
//!
//! - **RPC dispatch** ([`rpc`]): requests are routed by type to bound handler
//!   methods through an onion of middleware, and every outcome comes back as
//!   an [`RpcResult`] envelope
//! - **Structured logging** ([`log`]): events are fanned out per channel to
//!   independent consumers that drain their queues in batches
//!
//! ## Example
//!
//! ```ignore
//! use feedcore::{AppContext, RpcEngine, StructuredLogger};
//! use feedcore::log::{JsonLinesSink, LoggerConfig, GENERAL_LOG};
//!
//! #[tokio::main]
//! async fn main() -> feedcore::Result<()> {
//!     let engine = RpcEngine::builder()
//!         .candidate::<FeedHandler>()
//!         .instances(Arc::new(InstanceRegistry::new().singleton(Arc::new(FeedHandler::new()))))
//!         .build()?;
//!     let logger = StructuredLogger::builder(LoggerConfig::default())
//!         .consumer(GENERAL_LOG, JsonLinesSink::stdout())
//!         .build();
//!
//!     let app = AppContext::new(engine, logger);
//!     let page: RpcResult<FeedPage> = app.engine().execute(FetchFeed::new("hn")).await;
//!     app.logger().info(GENERAL_LOG, || format!("fetched: {}", page.is_success()));
//!
//!     app.shutdown().await;
//!     Ok(())
//! }
//! ```

use std::future::Future;
use std::pin::Pin;

pub mod app;
pub mod error;
pub mod log;
pub mod rpc;

pub use app::AppContext;
pub use error::{BuildError, HandlerError, LogError, ResolveError, Result};
pub use log::StructuredLogger;
pub use rpc::{RpcEngine, RpcResult};

/// Boxed future used at the trait seams (middleware, sinks, handler invokers).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

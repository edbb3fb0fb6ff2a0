//! Structured asynchronous logging.
//!
//! - [`StructuredLogger`] fans events out to the consumers of a channel
//! - [`LogConsumer`] drains one consumer's queue in batches
//! - [`LogSink`] is the backend a consumer writes to

pub mod consumer;
pub mod event;
pub mod logger;
pub mod sinks;

pub use consumer::{ConsumerStats, LogConsumer, LogSink, DEFAULT_BATCH_CAPACITY};
pub use event::{LogEvent, LogLevel, GENERAL_LOG};
pub use logger::{LoggerBuilder, LoggerConfig, ShutdownReport, StructuredLogger};
pub use sinks::{JsonLinesSink, TracingSink};

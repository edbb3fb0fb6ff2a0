//! Built-in log sinks.

use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::consumer::LogSink;
use super::event::{LogEvent, LogLevel};
use crate::error::LogError;
use crate::BoxFuture;

/// Writes each event as one JSON line. Flushes once per batch.
pub struct JsonLinesSink<W> {
    name: String,
    writer: W,
    buffer: Vec<u8>,
}

impl JsonLinesSink<tokio::io::Stdout> {
    /// Console sink on standard output.
    pub fn stdout() -> Self {
        Self::new("stdout", tokio::io::stdout())
    }
}

impl<W> JsonLinesSink<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Sink named `name` writing to `writer`.
    pub fn new(name: impl Into<String>, writer: W) -> Self {
        Self {
            name: name.into(),
            writer,
            buffer: Vec::new(),
        }
    }

    /// Borrow the underlying writer.
    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    /// Recover the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W> LogSink for JsonLinesSink<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn process_batch<'a>(&'a mut self, batch: &'a [Arc<LogEvent>]) -> BoxFuture<'a, Result<(), LogError>> {
        Box::pin(async move {
            self.buffer.clear();
            for event in batch {
                serde_json::to_writer(&mut self.buffer, &**event)?;
                self.buffer.push(b'\n');
            }
            self.writer.write_all(&self.buffer).await?;
            self.writer.flush().await?;
            Ok::<(), LogError>(())
        })
    }
}

/// Re-emits events as `tracing` events, for apps without a log backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn name(&self) -> &str {
        "tracing"
    }

    fn process_batch<'a>(&'a mut self, batch: &'a [Arc<LogEvent>]) -> BoxFuture<'a, Result<(), LogError>> {
        for event in batch {
            emit(event);
        }
        Box::pin(async { Ok(()) })
    }
}

fn emit(event: &LogEvent) {
    let channel = event.channel.as_str();
    let fields = &event.fields;
    match event.level {
        LogLevel::Trace => tracing::trace!(channel, ?fields, "{}", event.message),
        LogLevel::Debug => tracing::debug!(channel, ?fields, "{}", event.message),
        LogLevel::Info => tracing::info!(channel, ?fields, "{}", event.message),
        LogLevel::Warn => tracing::warn!(channel, ?fields, "{}", event.message),
        LogLevel::Error => tracing::error!(channel, ?fields, "{}", event.message),
        LogLevel::Critical => tracing::error!(channel, critical = true, ?fields, "{}", event.message),
    }
}

//! Channel-based structured logger with per-consumer fan-out.
//!
//! Events are logged to a named channel. Every consumer registered for that
//! channel gets the same `Arc<LogEvent>` on its own queue, so a slow sink
//! never delays another or the caller.
//!
//! ```text
//!                   ┌─► queue ─► drain task ─► JSON lines
//! log("GENERAL_LOG")┤
//!                   └─► queue ─► drain task ─► tracing
//! ```
//!
//! # Example
//!
//! ```ignore
//! let logger = StructuredLogger::builder(LoggerConfig::default())
//!     .consumer(GENERAL_LOG, JsonLinesSink::stdout())
//!     .build();
//!
//! logger.info(GENERAL_LOG, || format!("fetched {} items", items.len()));
//! logger.shutdown().await;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::mpsc;

use super::consumer::{LogConsumer, LogSink, DEFAULT_BATCH_CAPACITY};
use super::event::{LogEvent, LogLevel};

/// Logger configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Events below this level are discarded before their factory runs.
    pub min_level: LogLevel,
    /// Starting capacity of each consumer's batch buffer.
    pub initial_batch_capacity: usize,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            min_level: LogLevel::Info,
            initial_batch_capacity: DEFAULT_BATCH_CAPACITY,
        }
    }
}

impl LoggerConfig {
    /// Set the minimum level.
    pub fn min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    /// Set the starting batch buffer capacity.
    pub fn initial_batch_capacity(mut self, capacity: usize) -> Self {
        self.initial_batch_capacity = capacity;
        self
    }
}

/// Outcome of [`StructuredLogger::shutdown`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Consumers that drained and exited normally.
    pub stopped: usize,
    /// Events processed across those consumers.
    pub events: u64,
    /// `channel/sink` of consumers whose task panicked.
    pub failed: Vec<String>,
}

impl ShutdownReport {
    /// True when no consumer task panicked.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Builder for [`StructuredLogger`].
pub struct LoggerBuilder {
    config: LoggerConfig,
    sinks: Vec<(String, Box<dyn LogSink>)>,
}

impl LoggerBuilder {
    /// Register a sink on a channel. A channel may have several sinks; each
    /// gets its own queue and drain task.
    pub fn consumer(mut self, channel: impl Into<String>, sink: impl LogSink) -> Self {
        let sink: Box<dyn LogSink> = Box::new(sink);
        self.sinks.push((channel.into(), sink));
        self
    }

    /// Create the queues and start every drain task.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn build(self) -> StructuredLogger {
        let mut channels: HashMap<String, Vec<mpsc::UnboundedSender<Arc<LogEvent>>>> =
            HashMap::new();
        let mut consumers = Vec::with_capacity(self.sinks.len());

        for (channel, sink) in self.sinks {
            let (tx, rx) = mpsc::unbounded_channel();
            consumers.push(LogConsumer::start(
                channel.clone(),
                sink,
                rx,
                self.config.initial_batch_capacity,
            ));
            channels.entry(channel).or_default().push(tx);
        }

        tracing::debug!(
            channels = channels.len(),
            consumers = consumers.len(),
            min_level = %self.config.min_level,
            "structured logger started"
        );

        StructuredLogger {
            min_level: self.config.min_level,
            channels,
            consumers,
        }
    }
}

/// Fan-out logger. See the [module docs](self).
pub struct StructuredLogger {
    min_level: LogLevel,
    channels: HashMap<String, Vec<mpsc::UnboundedSender<Arc<LogEvent>>>>,
    consumers: Vec<LogConsumer>,
}

impl StructuredLogger {
    /// Start building a logger with `config`.
    pub fn builder(config: LoggerConfig) -> LoggerBuilder {
        LoggerBuilder {
            config,
            sinks: Vec::new(),
        }
    }

    /// Log an event built by `factory`.
    ///
    /// The level is checked first, then the channel. `factory` runs only if
    /// both pass and runs once regardless of how many consumers the channel
    /// has. Never blocks.
    ///
    /// # Panics
    ///
    /// Panics if a consumer's drain task is gone, which only happens after
    /// its sink panicked.
    pub fn log<F>(&self, channel: &str, level: LogLevel, factory: F)
    where
        F: FnOnce() -> LogEvent,
    {
        if level < self.min_level {
            return;
        }
        let Some(senders) = self.channels.get(channel) else {
            return;
        };

        let mut event = factory();
        event.level = level;
        event.channel.clear();
        event.channel.push_str(channel);
        let event = Arc::new(event);

        for tx in senders {
            if tx.send(Arc::clone(&event)).is_err() {
                panic!("log consumer on channel {channel} is no longer running");
            }
        }
    }

    /// Whether an event at `level` on `channel` would reach any consumer.
    pub fn is_enabled(&self, channel: &str, level: LogLevel) -> bool {
        level >= self.min_level && self.channels.contains_key(channel)
    }

    /// Log a plain message at `Trace`. The level helpers below work the same way.
    pub fn trace<F, S>(&self, channel: &str, message: F)
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.log(channel, LogLevel::Trace, || LogEvent::new(message()));
    }

    pub fn debug<F, S>(&self, channel: &str, message: F)
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.log(channel, LogLevel::Debug, || LogEvent::new(message()));
    }

    pub fn info<F, S>(&self, channel: &str, message: F)
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.log(channel, LogLevel::Info, || LogEvent::new(message()));
    }

    pub fn warn<F, S>(&self, channel: &str, message: F)
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.log(channel, LogLevel::Warn, || LogEvent::new(message()));
    }

    pub fn error<F, S>(&self, channel: &str, message: F)
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.log(channel, LogLevel::Error, || LogEvent::new(message()));
    }

    pub fn critical<F, S>(&self, channel: &str, message: F)
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.log(channel, LogLevel::Critical, || LogEvent::new(message()));
    }

    /// Configured minimum level.
    pub fn min_level(&self) -> LogLevel {
        self.min_level
    }

    /// Channels with at least one consumer, sorted.
    pub fn channels(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.channels.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of consumers registered on `channel`.
    pub fn consumer_count(&self, channel: &str) -> usize {
        self.channels.get(channel).map_or(0, Vec::len)
    }

    /// Close every queue and wait for all consumers to drain.
    ///
    /// There is no timeout: shutdown returns only after every event logged
    /// before it was handed to its sinks.
    pub async fn shutdown(self) -> ShutdownReport {
        let Self {
            channels,
            consumers,
            ..
        } = self;
        drop(channels);

        let mut report = ShutdownReport::default();
        for consumer in consumers {
            let name = format!("{}/{}", consumer.channel(), consumer.sink_name());
            match consumer.wait_for_completion().await {
                Ok(stats) => {
                    report.stopped += 1;
                    report.events += stats.events;
                }
                Err(err) => {
                    tracing::error!(consumer = %name, error = %err, "log consumer terminated abnormally");
                    report.failed.push(name);
                }
            }
        }

        tracing::debug!(
            stopped = report.stopped,
            events = report.events,
            "structured logger stopped"
        );
        report
    }
}

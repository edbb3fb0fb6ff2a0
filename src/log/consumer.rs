//! Per-consumer batch drain loop.
//!
//! Each consumer owns one unbounded queue and one background task. The task
//! waits for an event, then takes everything else already queued and hands
//! the whole batch to its sink in a single call.
//!
//! ```text
//! logger ─► unbounded queue ─► drain task ─► sink.process_batch([..])
//! ```
//!
//! The loop exits once the queue is closed and empty, so awaiting
//! [`LogConsumer::wait_for_completion`] after closing the queue guarantees
//! every queued event reached the sink.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};

use super::event::LogEvent;
use crate::error::LogError;
use crate::BoxFuture;

/// Initial capacity of the batch buffer.
pub const DEFAULT_BATCH_CAPACITY: usize = 64;

/// A destination for batches of log events.
pub trait LogSink: Send + 'static {
    /// Name used in diagnostics.
    fn name(&self) -> &str;

    /// Process one batch, in queue order.
    ///
    /// An error is logged and the batch dropped; the consumer keeps running.
    fn process_batch<'a>(&'a mut self, batch: &'a [Arc<LogEvent>]) -> BoxFuture<'a, Result<(), LogError>>;
}

impl<S: LogSink + ?Sized> LogSink for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn process_batch<'a>(&'a mut self, batch: &'a [Arc<LogEvent>]) -> BoxFuture<'a, Result<(), LogError>> {
        (**self).process_batch(batch)
    }
}

/// Counters returned when a consumer stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    /// Events handed to the sink.
    pub events: u64,
    /// Calls to `process_batch`, successful or not.
    pub batches: u64,
    /// Batches the sink rejected.
    pub failed_batches: u64,
}

/// A running drain loop.
pub struct LogConsumer {
    channel: String,
    sink: String,
    task: JoinHandle<ConsumerStats>,
}

impl LogConsumer {
    /// Spawn the drain loop for `sink` on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn start<S: LogSink>(
        channel: impl Into<String>,
        sink: S,
        receiver: mpsc::UnboundedReceiver<Arc<LogEvent>>,
        initial_capacity: usize,
    ) -> Self {
        let channel = channel.into();
        let sink_name = sink.name().to_string();
        tracing::debug!(channel = %channel, sink = %sink_name, "starting log consumer");

        let task = tokio::spawn(drain_loop(
            channel.clone(),
            sink,
            receiver,
            initial_capacity,
        ));

        Self {
            channel,
            sink: sink_name,
            task,
        }
    }

    /// Channel this consumer is registered on.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Name reported by the sink at start.
    pub fn sink_name(&self) -> &str {
        &self.sink
    }

    /// Wait for the loop to drain and exit.
    ///
    /// Only returns once the queue's senders are all dropped. Fails if the
    /// sink panicked.
    pub async fn wait_for_completion(self) -> Result<ConsumerStats, JoinError> {
        self.task.await
    }
}

async fn drain_loop<S: LogSink>(
    channel: String,
    mut sink: S,
    mut rx: mpsc::UnboundedReceiver<Arc<LogEvent>>,
    initial_capacity: usize,
) -> ConsumerStats {
    let mut stats = ConsumerStats::default();
    let mut batch: Vec<Arc<LogEvent>> = Vec::with_capacity(initial_capacity.max(1));

    while let Some(first) = rx.recv().await {
        batch.push(first);

        while let Ok(event) = rx.try_recv() {
            if batch.len() == batch.capacity() {
                batch.reserve(batch.capacity());
            }
            batch.push(event);
        }

        if let Err(err) = sink.process_batch(&batch).await {
            stats.failed_batches += 1;
            tracing::warn!(
                channel = %channel,
                sink = sink.name(),
                events = batch.len(),
                error = %err,
                "log sink failed to process batch"
            );
        }

        stats.events += batch.len() as u64;
        stats.batches += 1;
        // Keeps capacity for the next batch.
        batch.clear();
    }

    tracing::debug!(
        channel = %channel,
        sink = sink.name(),
        events = stats.events,
        "log consumer drained"
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recording {
        batches: Arc<Mutex<Vec<Vec<String>>>>,
        fail_first: bool,
    }

    impl LogSink for Recording {
        fn name(&self) -> &str {
            "recording"
        }

        fn process_batch<'a>(&'a mut self, batch: &'a [Arc<LogEvent>]) -> BoxFuture<'a, Result<(), LogError>> {
            Box::pin(async move {
                let messages = batch.iter().map(|e| e.message.clone()).collect();
                self.batches.lock().unwrap().push(messages);
                if std::mem::take(&mut self.fail_first) {
                    return Err(LogError::Sink {
                        sink: "recording".into(),
                        message: "backend unavailable".into(),
                    });
                }
                Ok(())
            })
        }
    }

    fn event(message: &str) -> Arc<LogEvent> {
        Arc::new(LogEvent::new(message))
    }

    #[tokio::test]
    async fn test_queued_events_drain_as_one_batch() {
        let batches = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = mpsc::unbounded_channel();

        for i in 0..10 {
            tx.send(event(&format!("e{i}"))).unwrap();
        }
        drop(tx);

        let consumer = LogConsumer::start(
            "test",
            Recording {
                batches: batches.clone(),
                fail_first: false,
            },
            rx,
            2,
        );
        let stats = consumer.wait_for_completion().await.unwrap();

        assert_eq!(stats.events, 10);
        assert_eq!(stats.batches, 1);
        let batches = batches.lock().unwrap();
        assert_eq!(batches[0].len(), 10);
        assert_eq!(batches[0][0], "e0");
        assert_eq!(batches[0][9], "e9");
    }

    #[tokio::test]
    async fn test_sink_error_does_not_stop_consumer() {
        let batches = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = mpsc::unbounded_channel();

        let consumer = LogConsumer::start(
            "test",
            Recording {
                batches: batches.clone(),
                fail_first: true,
            },
            rx,
            DEFAULT_BATCH_CAPACITY,
        );
        assert_eq!(consumer.sink_name(), "recording");

        tx.send(event("first")).unwrap();
        tokio::task::yield_now().await;
        while batches.lock().unwrap().is_empty() {
            tokio::task::yield_now().await;
        }
        tx.send(event("second")).unwrap();
        drop(tx);

        let stats = consumer.wait_for_completion().await.unwrap();
        assert_eq!(stats.events, 2);
        assert_eq!(stats.failed_batches, 1);
        let flat: Vec<String> = batches.lock().unwrap().concat();
        assert_eq!(flat, vec!["first", "second"]);
    }
}

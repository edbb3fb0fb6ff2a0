//! Integration tests for the structured logger and its consumers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use feedcore::log::{
    JsonLinesSink, LogEvent, LogLevel, LogSink, LoggerConfig, StructuredLogger, GENERAL_LOG,
};
use feedcore::{BoxFuture, LogError};
use tokio::io::AsyncReadExt;

/// Collects every event it receives, plus the size of each batch.
#[derive(Clone, Default)]
struct MemorySink {
    events: Arc<Mutex<Vec<Arc<LogEvent>>>>,
    batch_sizes: Arc<Mutex<Vec<usize>>>,
}

impl MemorySink {
    fn messages(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.message.clone())
            .collect()
    }
}

impl LogSink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    fn process_batch<'a>(&'a mut self, batch: &'a [Arc<LogEvent>]) -> BoxFuture<'a, Result<(), LogError>> {
        Box::pin(async move {
            // Yield so the producer can queue up more than one event per batch.
            tokio::task::yield_now().await;
            self.events.lock().unwrap().extend(batch.iter().cloned());
            self.batch_sizes.lock().unwrap().push(batch.len());
            Ok(())
        })
    }
}

/// Rejects every batch.
struct BrokenSink;

impl LogSink for BrokenSink {
    fn name(&self) -> &str {
        "broken"
    }

    fn process_batch<'a>(&'a mut self, _batch: &'a [Arc<LogEvent>]) -> BoxFuture<'a, Result<(), LogError>> {
        Box::pin(async {
            Err(LogError::Sink {
                sink: "broken".into(),
                message: "index unavailable".into(),
            })
        })
    }
}

/// Panics on its first batch, taking its drain task down with it.
struct ExplodingSink;

impl LogSink for ExplodingSink {
    fn name(&self) -> &str {
        "exploding"
    }

    fn process_batch<'a>(&'a mut self, _batch: &'a [Arc<LogEvent>]) -> BoxFuture<'a, Result<(), LogError>> {
        panic!("audit index corrupted");
    }
}

#[tokio::test]
async fn test_channel_without_consumers_never_calls_factory() {
    let sink = MemorySink::default();
    let logger = StructuredLogger::builder(LoggerConfig::default())
        .consumer(GENERAL_LOG, sink.clone())
        .build();

    let calls = AtomicUsize::new(0);
    logger.log("AUDIT_LOG", LogLevel::Critical, || {
        calls.fetch_add(1, Ordering::SeqCst);
        LogEvent::new("unused")
    });
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let report = logger.shutdown().await;
    assert_eq!(report.events, 0);
    assert!(sink.messages().is_empty());
}

#[tokio::test]
async fn test_fan_out_preserves_order_per_consumer() {
    let x = MemorySink::default();
    let y = MemorySink::default();
    let logger = StructuredLogger::builder(LoggerConfig::default().initial_batch_capacity(1))
        .consumer(GENERAL_LOG, x.clone())
        .consumer(GENERAL_LOG, y.clone())
        .build();

    let expected: Vec<String> = (0..500).map(|i| format!("event {i}")).collect();
    for (i, message) in expected.iter().enumerate() {
        logger.info(GENERAL_LOG, || message.clone());
        if i % 50 == 0 {
            tokio::task::yield_now().await;
        }
    }

    let report = logger.shutdown().await;
    assert_eq!(report.stopped, 2);
    assert_eq!(report.events, 1000);

    assert_eq!(x.messages(), expected);
    assert_eq!(y.messages(), expected);
}

#[tokio::test]
async fn test_shutdown_drains_every_queued_event() {
    let sink = MemorySink::default();
    let logger = StructuredLogger::builder(LoggerConfig::default())
        .consumer(GENERAL_LOG, sink.clone())
        .build();

    for i in 0..1_000 {
        logger.log(GENERAL_LOG, LogLevel::Error, || {
            LogEvent::new("queued").field("seq", i)
        });
    }

    let report = logger.shutdown().await;
    assert!(report.is_clean());
    assert_eq!(report.events, 1_000);

    let events = sink.events.lock().unwrap();
    assert_eq!(events.len(), 1_000);
    assert_eq!(events[999].get_field("seq"), Some(&serde_json::json!(999)));

    // Everything was queued before the drain task first ran, so batches are large.
    let batches = sink.batch_sizes.lock().unwrap();
    assert!(batches.len() < 1_000);
    assert_eq!(batches.iter().sum::<usize>(), 1_000);
}

#[tokio::test]
async fn test_failing_sink_does_not_affect_siblings() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let healthy = MemorySink::default();
    let logger = StructuredLogger::builder(LoggerConfig::default())
        .consumer(GENERAL_LOG, BrokenSink)
        .consumer(GENERAL_LOG, healthy.clone())
        .build();

    logger.warn(GENERAL_LOG, || "first");
    logger.warn(GENERAL_LOG, || "second");

    let report = logger.shutdown().await;
    assert!(report.is_clean());
    assert_eq!(report.stopped, 2);
    assert_eq!(healthy.messages(), vec!["first", "second"]);
}

#[tokio::test]
async fn test_json_lines_sink_through_logger() {
    let (writer, mut reader) = tokio::io::duplex(64 * 1024);
    let logger = StructuredLogger::builder(LoggerConfig::default().min_level(LogLevel::Debug))
        .consumer(GENERAL_LOG, JsonLinesSink::new("pipe", writer))
        .build();

    logger.trace(GENERAL_LOG, || "filtered out");
    logger.debug(GENERAL_LOG, || "fetching feed");
    logger.log(GENERAL_LOG, LogLevel::Info, || {
        LogEvent::new("feed fetched").field("items", 30)
    });
    logger.shutdown().await;

    let mut output = String::new();
    reader.read_to_string(&mut output).await.unwrap();
    let lines: Vec<serde_json::Value> = output
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["level"], "debug");
    assert_eq!(lines[0]["channel"], GENERAL_LOG);
    assert_eq!(lines[1]["message"], "feed fetched");
    assert_eq!(lines[1]["fields"]["items"], 30);
}

#[tokio::test]
async fn test_dead_consumer_makes_log_panic_and_shutdown_report_it() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let healthy = MemorySink::default();
    let logger = StructuredLogger::builder(LoggerConfig::default())
        .consumer("AUDIT_LOG", ExplodingSink)
        .consumer(GENERAL_LOG, healthy.clone())
        .build();

    logger.warn("AUDIT_LOG", || "first");
    // Let the drain task pick up the event and die.
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    let rejected = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        logger.warn("AUDIT_LOG", || "second");
    }));
    assert!(rejected.is_err());

    logger.info(GENERAL_LOG, || "still running");

    let report = logger.shutdown().await;
    assert!(!report.is_clean());
    assert_eq!(report.failed, vec!["AUDIT_LOG/exploding".to_string()]);
    assert_eq!(report.stopped, 1);
    assert_eq!(report.events, 1);
    assert_eq!(healthy.messages(), vec!["still running"]);
}

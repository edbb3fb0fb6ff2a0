//! Process-wide application context.
//!
//! Created once at startup and passed by reference (or inside an `Arc`) to
//! whatever needs to dispatch requests or log.

use crate::log::{ShutdownReport, StructuredLogger};
use crate::rpc::RpcEngine;

/// The dispatch engine and logger of one running application.
pub struct AppContext {
    engine: RpcEngine,
    logger: StructuredLogger,
}

impl AppContext {
    pub fn new(engine: RpcEngine, logger: StructuredLogger) -> Self {
        Self { engine, logger }
    }

    /// The dispatch engine.
    pub fn engine(&self) -> &RpcEngine {
        &self.engine
    }

    /// The structured logger.
    pub fn logger(&self) -> &StructuredLogger {
        &self.logger
    }

    /// Stop the application, draining every log consumer.
    pub async fn shutdown(self) -> ShutdownReport {
        let report = self.logger.shutdown().await;
        if !report.is_clean() {
            tracing::warn!(failed = ?report.failed, "log consumers failed during shutdown");
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::{LoggerConfig, TracingSink, GENERAL_LOG};

    #[tokio::test]
    async fn test_shutdown_drains_logger() {
        let engine = RpcEngine::builder().build().unwrap();
        let logger = StructuredLogger::builder(LoggerConfig::default())
            .consumer(GENERAL_LOG, TracingSink)
            .build();
        let app = AppContext::new(engine, logger);

        app.logger().info(GENERAL_LOG, || "starting");
        assert!(app.engine().registry().is_empty());

        let report = app.shutdown().await;
        assert_eq!(report.stopped, 1);
        assert_eq!(report.events, 1);
    }
}

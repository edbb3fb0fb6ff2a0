//! Error reporting for failed requests.
//!
//! Every handler or middleware failure is reported exactly once before it is
//! turned into a failure envelope. The reporter sees the full error,
//! including its source chain; the caller only sees `"{kind}: {message}"`.

use std::fmt;

use uuid::Uuid;

use super::markers::Markers;
use crate::error::HandlerError;

/// Identifier assigned to one error report.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReportId(String);

impl ReportId {
    /// A fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// The id as text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ReportId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ReportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ReportId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Where a reported error happened.
#[derive(Debug, Clone)]
pub struct ReportContext {
    /// `Handler::method` of the dispatched handler.
    pub handler: String,
    /// Short name of the request type.
    pub request_type: &'static str,
    /// Marker type names on the handler.
    pub markers: Vec<&'static str>,
}

impl ReportContext {
    pub(crate) fn new(handler: String, request_type: &'static str, markers: &Markers) -> Self {
        Self {
            handler,
            request_type,
            markers: markers.type_names().collect(),
        }
    }
}

/// Receives handler errors.
pub trait ErrorReporter: Send + Sync {
    /// Record one error and return its report id.
    fn report(&self, error: &HandlerError, context: &ReportContext) -> ReportId;
}

/// Default reporter: emits the error as a `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, error: &HandlerError, context: &ReportContext) -> ReportId {
        let id = ReportId::new();
        tracing::error!(
            report_id = %id,
            handler = %context.handler,
            request = context.request_type,
            kind = error.kind(),
            source = ?error.source(),
            "rpc handler failed: {}",
            error.message()
        );
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Audited;

    #[test]
    fn test_report_ids_are_unique() {
        let a = ReportId::new();
        let b = ReportId::new();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 36);
    }

    #[test]
    fn test_report_context_lists_markers() {
        let markers = Markers::new().with(Audited);
        let context = ReportContext::new("FeedHandler::fetch".into(), "FetchFeed", &markers);

        assert_eq!(context.markers, vec!["Audited"]);
        assert_eq!(context.request_type, "FetchFeed");
    }

    #[test]
    fn test_tracing_reporter_returns_id() {
        let context = ReportContext::new("H::m".into(), "Req", &Markers::new());
        let id = TracingReporter.report(&HandlerError::new("Oops", "bad"), &context);
        assert!(!id.as_str().is_empty());
    }
}

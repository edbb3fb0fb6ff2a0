//! Error types for feedcore.
//!
//! Errors fall into three groups:
//!
//! - [`BuildError`] - configuration mistakes found while binding handlers or
//!   assembling the engine. These abort startup.
//! - [`HandlerError`] - anything a handler or middleware fails with while a
//!   request is in flight. The engine reports it and turns it into a failure
//!   envelope; it never escapes `execute`.
//! - [`LogError`] - logger configuration and sink I/O failures.

use std::any::Any;
use std::borrow::Cow;
use std::fmt;

use thiserror::Error;

use crate::rpc::types::{short_type_name, TypeInfo};

/// Configuration errors raised while building descriptors, the registry, or
/// the engine.
#[derive(Debug, Error)]
pub enum BuildError {
    /// A method was bound with an empty name.
    #[error("handler {handler} binds a method with an empty name")]
    EmptyMethodName { handler: &'static str },

    /// A handler declares a parameter type outside the request type and the
    /// allowed extra parameters.
    #[error("{handler} declares parameter {parameter} which is neither its request type nor an allowed extra parameter")]
    DisallowedParameter {
        handler: String,
        parameter: &'static str,
    },

    /// A handler declares the same extra parameter type twice.
    #[error("{handler} declares parameter {parameter} more than once")]
    DuplicateParameter {
        handler: String,
        parameter: &'static str,
    },

    /// A handler returns something other than `()`, its response type, or
    /// `RpcResult` of its response type.
    #[error("{handler} returns {found}; expected (), {response} or RpcResult<{response}>")]
    UnsupportedReturnShape {
        handler: String,
        found: &'static str,
        response: &'static str,
    },

    /// Two handlers are bound to the same request type.
    #[error("request type {request} is bound by both {first} and {second}")]
    DuplicateBinding {
        request: &'static str,
        first: String,
        second: String,
    },

    /// A middleware type could not be obtained from the instance provider.
    #[error("middleware {middleware} is unavailable: {source}")]
    MiddlewareUnavailable {
        middleware: &'static str,
        #[source]
        source: ResolveError,
    },
}

/// Failure to obtain an instance from an [`InstanceProvider`](crate::rpc::InstanceProvider).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// Nothing is registered for the type.
    #[error("no instance registered for {type_name}")]
    NotRegistered { type_name: &'static str },

    /// The registered instance has a different concrete type.
    #[error("instance registered for {type_name} has a different type")]
    TypeMismatch { type_name: &'static str },
}

/// Logger configuration and sink errors.
#[derive(Debug, Error)]
pub enum LogError {
    /// I/O error while a sink wrote a batch.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error while a sink encoded an event.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A level string did not name a known level.
    #[error("unknown log level: {0}")]
    UnknownLevel(String),

    /// Sink-specific failure.
    #[error("sink {sink} failed: {message}")]
    Sink { sink: String, message: String },
}

/// Result type alias defaulting to [`BuildError`].
pub type Result<T, E = BuildError> = std::result::Result<T, E>;

/// A request-time failure raised by a handler or middleware.
///
/// Any `std::error::Error` converts into it, so handlers can use `?` on their
/// own error types; boxed errors go through [`HandlerError::from_boxed`].
/// The concrete error type name is kept in `kind` and ends up in the failure
/// envelope as `"{kind}: {message}"`; the original error is only handed to
/// the error reporter.
pub struct HandlerError {
    kind: Cow<'static, str>,
    message: String,
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl HandlerError {
    /// Create an error with an explicit kind and message.
    pub fn new(kind: impl Into<Cow<'static, str>>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Wrap a concrete error, recording its type name as the kind.
    pub fn from_error<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            kind: Cow::Borrowed(short_type_name(std::any::type_name::<E>())),
            message: error.to_string(),
            source: Some(Box::new(error)),
        }
    }

    /// Wrap an already type-erased error under a caller-chosen kind.
    ///
    /// For `Box<dyn Error>` values (and crates that hand those out), which
    /// have no concrete type name to use as the kind.
    pub fn from_boxed(
        kind: impl Into<Cow<'static, str>>,
        error: Box<dyn std::error::Error + Send + Sync + 'static>,
    ) -> Self {
        Self {
            kind: kind.into(),
            message: error.to_string(),
            source: Some(error),
        }
    }

    /// Build an error from a caught panic payload.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "panic with non-string payload".to_string()
        };
        Self::new("panic", message)
    }

    /// A declared extra parameter was not present in the context.
    pub fn missing_parameter(parameter: TypeInfo) -> Self {
        Self::new(
            "MissingParameter",
            format!("no value supplied for parameter {}", parameter.name()),
        )
    }

    /// Concrete error type name, or the explicit kind.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Human-readable message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The wrapped error, if this was built from one.
    pub fn source(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    /// The text placed into a failure envelope.
    pub fn failure_message(&self) -> String {
        format!("{}: {}", self.kind, self.message)
    }
}

impl<E> From<E> for HandlerError
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Self::from_error(error)
    }
}

impl fmt::Debug for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerError")
            .field("kind", &self.kind)
            .field("message", &self.message)
            .field("source", &self.source)
            .finish()
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("feed {0} timed out")]
    struct FetchTimeout(String);

    #[test]
    fn test_handler_error_from_concrete_error() {
        let err: HandlerError = FetchTimeout("hn".into()).into();

        assert_eq!(err.kind(), "FetchTimeout");
        assert_eq!(err.message(), "feed hn timed out");
        assert_eq!(err.failure_message(), "FetchTimeout: feed hn timed out");
        assert!(err.source().is_some());
    }

    #[test]
    fn test_handler_error_question_mark() {
        fn parse(input: &str) -> std::result::Result<u32, HandlerError> {
            Ok(input.parse::<u32>()?)
        }

        let err = parse("nope").unwrap_err();
        assert_eq!(err.kind(), "ParseIntError");
    }

    #[test]
    fn test_handler_error_from_boxed_error() {
        fn load(url: &str) -> std::result::Result<u32, Box<dyn std::error::Error + Send + Sync>> {
            Err(format!("no route to {url}").into())
        }

        let err = load("lobste.rs")
            .map_err(|e| HandlerError::from_boxed("FetchFailed", e))
            .unwrap_err();
        assert_eq!(err.failure_message(), "FetchFailed: no route to lobste.rs");
        assert!(err.source().is_some());

        let err = HandlerError::from_boxed("FeedTimeout", Box::new(FetchTimeout("hn".into())));
        assert_eq!(err.kind(), "FeedTimeout");
        assert_eq!(err.message(), "feed hn timed out");
    }

    #[test]
    fn test_handler_error_from_panic_payloads() {
        let err = HandlerError::from_panic(Box::new("boom"));
        assert_eq!(err.failure_message(), "panic: boom");

        let err = HandlerError::from_panic(Box::new(String::from("owned boom")));
        assert_eq!(err.message(), "owned boom");

        let err = HandlerError::from_panic(Box::new(42u8));
        assert_eq!(err.kind(), "panic");
    }

    #[test]
    fn test_build_error_messages() {
        let err = BuildError::DuplicateBinding {
            request: "Ping",
            first: "PingHandler::ping".into(),
            second: "OtherHandler::ping".into(),
        };
        let text = err.to_string();
        assert!(text.contains("PingHandler::ping"));
        assert!(text.contains("OtherHandler::ping"));
    }
}

//! The uniform result envelope returned by every dispatch.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Response headers carried by both success and failure envelopes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers(BTreeMap<String, String>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a header, returning the previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(name.into(), value.into())
    }

    /// Value of header `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.0.remove(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Outcome of a dispatch: a typed payload or one or more error messages.
///
/// Handlers may also return this directly when they want to report a
/// business failure without raising an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RpcResult<T> {
    Success {
        payload: T,
        #[serde(default, skip_serializing_if = "Headers::is_empty")]
        headers: Headers,
    },
    Failure {
        errors: Vec<String>,
        #[serde(default, skip_serializing_if = "Headers::is_empty")]
        headers: Headers,
    },
}

impl<T> RpcResult<T> {
    pub fn ok(payload: T) -> Self {
        Self::Success {
            payload,
            headers: Headers::new(),
        }
    }

    /// Failure with a single error message.
    pub fn fail(message: impl Into<String>) -> Self {
        Self::Failure {
            errors: vec![message.into()],
            headers: Headers::new(),
        }
    }

    /// Failure with several messages. An empty list still yields a failure,
    /// with a generic message so `errors()` is never empty.
    pub fn fail_many<I, S>(messages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut errors: Vec<String> = messages.into_iter().map(Into::into).collect();
        if errors.is_empty() {
            errors.push("request failed".to_string());
        }
        Self::Failure {
            errors,
            headers: Headers::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn is_failure(&self) -> bool {
        !self.is_success()
    }

    /// The payload of a success.
    pub fn payload(&self) -> Option<&T> {
        match self {
            Self::Success { payload, .. } => Some(payload),
            Self::Failure { .. } => None,
        }
    }

    /// Consume the envelope, keeping only a success payload.
    pub fn into_payload(self) -> Option<T> {
        match self {
            Self::Success { payload, .. } => Some(payload),
            Self::Failure { .. } => None,
        }
    }

    /// Error messages; empty for a success.
    pub fn errors(&self) -> &[String] {
        match self {
            Self::Success { .. } => &[],
            Self::Failure { errors, .. } => errors,
        }
    }

    /// Response headers; kept on both success and failure.
    pub fn headers(&self) -> &Headers {
        match self {
            Self::Success { headers, .. } | Self::Failure { headers, .. } => headers,
        }
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        match self {
            Self::Success { headers, .. } | Self::Failure { headers, .. } => headers,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers_mut().insert(name, value);
        self
    }

    /// Transform the payload, keeping headers and failures.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> RpcResult<U> {
        match self {
            Self::Success { payload, headers } => RpcResult::Success {
                payload: f(payload),
                headers,
            },
            Self::Failure { errors, headers } => RpcResult::Failure { errors, headers },
        }
    }

    /// Drop the headers and convert into a plain `Result`.
    pub fn into_result(self) -> Result<T, Vec<String>> {
        match self {
            Self::Success { payload, .. } => Ok(payload),
            Self::Failure { errors, .. } => Err(errors),
        }
    }
}

impl<T> From<Result<T, String>> for RpcResult<T> {
    fn from(result: Result<T, String>) -> Self {
        match result {
            Ok(payload) => Self::ok(payload),
            Err(message) => Self::fail(message),
        }
    }
}

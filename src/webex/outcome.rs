// webex/outcome.rs

//! Per-request outcome and the error taxonomy used across the crate.

use std::fmt;

use enum_iterator::Sequence;
use serde_json::Value;

/// Result of one logical API call: the decoded payload or a classified failure.
pub type RequestOutcome<T> = Result<T, ApiFailure>;

/// Classification of a failed request, driving retry and abort decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Sequence)]
pub enum ErrorKind {
    /// Connection refused/reset or timeout.
    TransientNetwork,
    /// HTTP 429 still returned after the retry budget was spent.
    RateLimited,
    /// HTTP 5xx still returned after the retry budget was spent.
    Server,
    /// HTTP 401/403. Will recur for every item, so a batch stops on it.
    Authentication,
    /// Input rejected locally or with a 4xx not covered below.
    Validation,
    /// HTTP 409.
    Conflict,
    /// HTTP 404.
    NotFound,
    /// A body could not be encoded or decoded.
    Serialization,
    /// The item was never started because the batch was cancelled.
    Cancelled,
}

impl ErrorKind {
    /// Maps a non-2xx HTTP status to its kind.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => ErrorKind::Authentication,
            404 => ErrorKind::NotFound,
            409 => ErrorKind::Conflict,
            429 => ErrorKind::RateLimited,
            500..=599 => ErrorKind::Server,
            _ => ErrorKind::Validation,
        }
    }

    /// Whether the executor should try the request again.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::TransientNetwork | ErrorKind::RateLimited | ErrorKind::Server
        )
    }

    /// Whether a failure of this kind should stop the whole batch.
    pub fn is_batch_fatal(self) -> bool {
        self == ErrorKind::Authentication
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::TransientNetwork => "network error",
            ErrorKind::RateLimited => "rate limited",
            ErrorKind::Server => "server error",
            ErrorKind::Authentication => "authentication error",
            ErrorKind::Validation => "validation error",
            ErrorKind::Conflict => "conflict",
            ErrorKind::NotFound => "not found",
            ErrorKind::Serialization => "serialization error",
            ErrorKind::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// A failed request, with the server's message and status kept for reports.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}{}: {message}", status_suffix(.status))]
pub struct ApiFailure {
    pub kind: ErrorKind,
    pub message: String,
    pub status: Option<u16>,
}

impl ApiFailure {
    pub fn new(kind: ErrorKind, message: impl Into<String>, status: Option<u16>) -> Self {
        Self {
            kind,
            message: message.into(),
            status,
        }
    }

    /// Builds a failure from a non-2xx response.
    pub fn from_response(status: u16, body: &str) -> Self {
        Self::new(
            ErrorKind::from_status(status),
            server_message(body),
            Some(status),
        )
    }

    pub fn network(err: &reqwest::Error) -> Self {
        Self::new(ErrorKind::TransientNetwork, err.to_string(), None)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message, None)
    }

    pub fn cancelled() -> Self {
        Self::new(
            ErrorKind::Cancelled,
            "not started: batch was cancelled",
            None,
        )
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

/// Extracts the most specific message from a Webex error body.
///
/// Webex errors look like `{"message": "...", "errors": [{"description": "..."}]}`.
/// Non-JSON bodies are returned as-is so nothing is lost for diagnostics.
pub(crate) fn server_message(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty response body".to_string();
    }
    let Ok(json) = serde_json::from_str::<Value>(trimmed) else {
        return trimmed.to_string();
    };
    let description = json
        .get("errors")
        .and_then(Value::as_array)
        .and_then(|errors| errors.first())
        .and_then(|e| e.get("description"))
        .and_then(Value::as_str);
    let message = json.get("message").and_then(Value::as_str);
    description
        .or(message)
        .map(str::to_string)
        .unwrap_or_else(|| trimmed.to_string())
}

use std::fmt;

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug)]
pub enum DashboardApiError {
    Request(reqwest::Error),
    Status(StatusCode, String),
    MalformedPayload(String),
    RetryExhausted {
        status: Option<StatusCode>,
        last_error: Option<String>,
    },
    Cancelled,
}

/// Error body shape of the dashboard server. Plain endpoints answer
/// `{"detail": ...}`, where `detail` may be a string or a validation
/// structure; some legacy paths answer `{"error": "..."}`.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorPayload {
    pub detail: Option<Value>,
    pub error: Option<String>,
}

impl ErrorPayload {
    pub fn message(&self) -> Option<String> {
        if let Some(detail) = &self.detail {
            return Some(match detail.as_str() {
                Some(text) => text.to_string(),
                None => detail.to_string(),
            });
        }
        self.error
            .as_deref()
            .filter(|value| !value.is_empty())
            .map(ToString::to_string)
    }
}

impl fmt::Display for DashboardApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request(error) => write!(f, "request error: {error}"),
            Self::Status(status, message) => write!(f, "HTTP {status} {message}"),
            Self::MalformedPayload(message) => write!(f, "malformed payload: {message}"),
            Self::RetryExhausted { status, last_error } => {
                let status = status
                    .map(|status| status.as_u16().to_string())
                    .unwrap_or_else(|| "n/a".to_owned());
                write!(
                    f,
                    "retry exhausted after max attempts (status: {status}, last_error: {last_error:?})"
                )
            }
            Self::Cancelled => write!(f, "request was cancelled"),
        }
    }
}

impl std::error::Error for DashboardApiError {}

impl From<reqwest::Error> for DashboardApiError {
    fn from(error: reqwest::Error) -> Self {
        Self::Request(error)
    }
}

/// Extract a human-readable message from an error response body.
pub fn parse_error_message(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ErrorPayload>(body) {
        if let Some(message) = payload.message() {
            return message;
        }
    }

    if body.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        body.to_string()
    }
}

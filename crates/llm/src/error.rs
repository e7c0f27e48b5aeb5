use std::sync::LazyLock;
use std::time::Duration;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use regex::Regex;
use serde::Serialize;
use thiserror::Error;

use crate::assembler::ParseError;

/// Errors returned before the event stream is opened.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The request body is malformed or fails validation.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The requested model is not configured.
    #[error("Model '{0}' not found")]
    ModelNotFound(String),

    /// Internal server error.
    /// If Some(message), the message is safe to show to the client.
    #[error("Internal server error")]
    InternalError(Option<String>),
}

impl LlmError {
    /// HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::ModelNotFound(_) => StatusCode::NOT_FOUND,
            Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Error type string of the response body.
    pub fn error_type(&self) -> &str {
        match self {
            Self::InvalidRequest(_) => "invalid_request_error",
            Self::ModelNotFound(_) => "not_found_error",
            Self::InternalError(_) => "internal_error",
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorDetails,
}

#[derive(Debug, Serialize)]
struct ErrorDetails {
    message: String,
    r#type: String,
    code: u16,
}

impl IntoResponse for LlmError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let message = match &self {
            Self::InternalError(Some(message)) => message.clone(),
            Self::InternalError(None) => {
                log::error!("Internal server error occurred");
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        };

        let body = ErrorResponse {
            error: ErrorDetails {
                message,
                r#type: self.error_type().to_string(),
                code: status.as_u16(),
            },
        };

        (status, Json(body)).into_response()
    }
}

/// A failed provider call, classified by how the dispatcher may recover.
#[derive(Debug, Clone, PartialEq, Error)]
pub(crate) enum ProviderError {
    /// Quota or rate limit hit. Retried with backoff, then on another credential.
    #[error("Rate limited by provider: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    /// Temporary overload. Retried with backoff on the same credential.
    #[error("Provider temporarily unavailable: {0}")]
    Unavailable(String),

    /// Anything else. Never retried.
    #[error("Provider rejected the request: {0}")]
    Fatal(String),
}

impl ProviderError {
    /// Classify a non-success HTTP response.
    pub(crate) fn from_status(status: u16, body: &str) -> Self {
        let message = provider_message(body);

        match status {
            429 => Self::RateLimited {
                retry_after: retry_hint(body),
                message,
            },
            500 | 502 | 503 | 504 => Self::Unavailable(message),
            _ => Self::from_message(message).unwrap_or_else(|message| Self::Fatal(format!("HTTP {status}: {message}"))),
        }
    }

    /// Classify an error object delivered inside the event stream.
    pub(crate) fn from_stream_status(status: Option<&str>, message: String) -> Self {
        match status {
            Some("RESOURCE_EXHAUSTED") => Self::RateLimited {
                retry_after: retry_hint(&message),
                message,
            },
            Some("UNAVAILABLE" | "INTERNAL" | "DEADLINE_EXCEEDED") => Self::Unavailable(message),
            _ => Self::from_message(message).unwrap_or_else(Self::Fatal),
        }
    }

    /// Classify by the wording of the message when the status says nothing
    /// useful. Hands the message back when it names neither a quota nor an
    /// overload.
    fn from_message(message: String) -> Result<Self, String> {
        if QUOTA_MESSAGE.is_match(&message) {
            Ok(Self::RateLimited {
                retry_after: retry_hint(&message),
                message,
            })
        } else if OVERLOAD_MESSAGE.is_match(&message) {
            Ok(Self::Unavailable(message))
        } else {
            Err(message)
        }
    }

    /// Connection, timeout and body read failures are treated as overload.
    pub(crate) fn from_transport(error: impl std::fmt::Display) -> Self {
        Self::Unavailable(format!("Connection to provider failed: {error}"))
    }

    /// Label used in logs and metrics.
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } => "rate_limited",
            Self::Unavailable(_) => "unavailable",
            Self::Fatal(_) => "fatal",
        }
    }
}

static RETRY_IN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)retry in\s+(\d+(?:\.\d+)?)\s*(milliseconds?|msecs?|ms|seconds?|secs?|s)\b")
        .expect("valid retry hint pattern")
});

static QUOTA_MESSAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)quota|rate[ _-]?limit|resource[ _]exhausted|too many requests").expect("valid quota pattern")
});

static OVERLOAD_MESSAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)overloaded|unavailable").expect("valid overload pattern"));

static RETRY_DELAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""retryDelay"\s*:\s*"(\d+(?:\.\d+)?)s""#).expect("valid retry delay pattern"));

/// Extracts a retry-after hint from provider error text.
///
/// Understands `Please retry in 7.2s`, `retry in 7 seconds`, `retry in 850ms` and the
/// `"retryDelay": "7s"` field of Google `RetryInfo` details.
pub(crate) fn retry_hint(text: &str) -> Option<Duration> {
    if let Some(captures) = RETRY_IN.captures(text) {
        let value: f64 = captures[1].parse().ok()?;
        let seconds = if captures[2].to_ascii_lowercase().starts_with('m') {
            value / 1000.0
        } else {
            value
        };

        return Duration::try_from_secs_f64(seconds).ok();
    }

    let captures = RETRY_DELAY.captures(text)?;
    let seconds: f64 = captures[1].parse().ok()?;

    Duration::try_from_secs_f64(seconds).ok()
}

/// The `error.message` of a Google error body, or the raw body.
fn provider_message(body: &str) -> String {
    #[derive(serde::Deserialize)]
    struct Body {
        error: Inner,
    }

    #[derive(serde::Deserialize)]
    struct Inner {
        message: String,
    }

    match sonic_rs::from_str::<Body>(body) {
        Ok(parsed) => parsed.error.message,
        Err(_) if body.trim().is_empty() => "empty response body".to_string(),
        Err(_) => body.trim().to_string(),
    }
}

/// Terminal failure of a dispatched request.
#[derive(Debug, Error)]
pub(crate) enum DispatchError {
    /// The completed answer could not be parsed into the expected payload.
    #[error("Response failed schema validation: {0}")]
    SchemaValidation(#[from] ParseError),

    /// Retries ran out, or every credential was rate limited.
    #[error("Provider capacity exhausted after {calls} calls: {last}")]
    Exhausted { calls: u32, last: ProviderError },

    /// The provider rejected the request.
    #[error(transparent)]
    Fatal(ProviderError),

    /// The client went away.
    #[error("Request cancelled by the client")]
    Cancelled,
}

impl DispatchError {
    /// Message relayed to the client in the `error` event.
    pub(crate) fn user_message(&self) -> &'static str {
        match self {
            Self::SchemaValidation(_) => "Could not parse the response. Please try again.",
            Self::Exhausted { .. } => "The service is temporarily saturated. Please try again in a few minutes.",
            Self::Fatal(_) => "The request could not be processed. Please try again later.",
            Self::Cancelled => "The request was cancelled.",
        }
    }

    /// Label used in logs and metrics.
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::SchemaValidation(_) => "schema_validation_failed",
            Self::Exhausted { .. } => "all_credentials_exhausted",
            Self::Fatal(_) => "fatal",
            Self::Cancelled => "client_cancelled",
        }
    }
}

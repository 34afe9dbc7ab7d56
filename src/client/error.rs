use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

use crate::domain::{ErrorCode, ResponseParameters, ValidationError};
use crate::transport::EncodeError;

pub(crate) type BoxError = Box<dyn StdError + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Raw HTTP response kept on an [`ApiError`] for diagnostics.
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// The service understood the request and declined it (`ok == false`).
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    pub parameters: Option<ResponseParameters>,
    pub response: Option<RawResponse>,
}

impl ApiError {
    /// How long the service asked to wait before repeating the request.
    pub fn retry_after(&self) -> Option<Duration> {
        self.parameters.as_ref().and_then(ResponseParameters::retry_after)
    }

    /// The supergroup a migrated group now lives in.
    pub fn migrate_to_chat_id(&self) -> Option<i64> {
        self.parameters.as_ref().and_then(|p| p.migrate_to_chat_id)
    }

    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "telegram: {} {}", self.code.as_i32(), self.message)
    }
}

impl StdError for ApiError {}

#[derive(Debug, thiserror::Error)]
/// Errors returned by [`Bot`](crate::Bot) and the delivery machinery.
pub enum BotError {
    /// Every attempt failed at the HTTP level (DNS, TLS, connect, timeout).
    #[error("transport error after {attempts} attempts: {source}")]
    TransportExhausted {
        attempts: u32,
        #[source]
        source: BoxError,
    },

    /// A single, non-retried request failed at the HTTP level (file downloads).
    #[error("transport error: {0}")]
    Transport(#[source] BoxError),

    /// The governing cancellation token fired.
    #[error("request cancelled")]
    Cancelled,

    /// The body is not a response envelope.
    #[error("malformed response envelope (HTTP {status}): {source}")]
    MalformedEnvelope {
        status: u16,
        #[source]
        source: serde_json::Error,
    },

    /// The service rejected the request.
    #[error("{0}")]
    Api(#[from] ApiError),

    /// `ok == true` but `result` does not have the expected shape.
    #[error("malformed result for `{method}`: {source}")]
    MalformedResult {
        method: String,
        #[source]
        source: serde_json::Error,
    },

    /// The parameter bag could not be put on the wire.
    #[error("failed to encode request: {0}")]
    Encode(#[from] EncodeError),

    /// Non-successful HTTP status on a plain (non-envelope) request such as a download.
    #[error("unexpected HTTP status: {status}")]
    HttpStatus { status: u16 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Polling or webhook delivery was started without an update handler.
    #[error("update handler is required")]
    HandlerRequired,

    /// One of the domain constructors rejected an invalid value.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Building the HTTP client or the webhook TLS configuration failed.
    #[error("configuration error: {0}")]
    Config(#[source] BoxError),

    /// The webhook server could not bind or accept connections.
    #[error("webhook server error: {0}")]
    Server(#[source] BoxError),
}

impl BotError {
    /// The rejection, if the service declined the request.
    pub fn api(&self) -> Option<&ApiError> {
        match self {
            Self::Api(err) => Some(err),
            _ => None,
        }
    }

    /// Whether repeating the same call may succeed.
    ///
    /// Rejections are retryable only for rate limiting (429) and server errors
    /// (5xx). HTTP-level failures are retryable, and so is an undecodable body
    /// served with 429 or 5xx, such as a proxy error page. Other malformed data,
    /// cancellation and caller mistakes are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Api(err) => err.is_retryable(),
            Self::TransportExhausted { .. }
            | Self::Transport(_)
            | Self::HttpStatus { .. }
            | Self::Io(_) => true,
            Self::MalformedEnvelope { status, .. } => {
                ErrorCode::new(i32::from(*status)).is_retryable()
            }
            Self::Cancelled
            | Self::MalformedResult { .. }
            | Self::Encode(_)
            | Self::HandlerRequired
            | Self::Validation(_)
            | Self::Config(_)
            | Self::Server(_) => false,
        }
    }
}

/// Advisory classifier for callers running their own retry loop around a call.
///
/// `None` (no error) is never retryable.
pub fn is_retryable(err: Option<&BotError>) -> bool {
    err.is_some_and(BotError::is_retryable)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(code: i32) -> BotError {
        BotError::Api(ApiError {
            code: ErrorCode::new(code),
            message: "x".to_owned(),
            parameters: None,
            response: None,
        })
    }

    #[test]
    fn no_error_is_not_retryable() {
        assert!(!is_retryable(None));
    }

    #[test]
    fn rejections_follow_code() {
        assert!(is_retryable(Some(&api(429))));
        assert!(is_retryable(Some(&api(503))));
        assert!(is_retryable(Some(&api(500))));
        assert!(!is_retryable(Some(&api(400))));
        assert!(!is_retryable(Some(&api(403))));
    }

    #[test]
    fn transport_failures_are_retryable() {
        let err = BotError::TransportExhausted {
            attempts: 4,
            source: "connection refused".into(),
        };
        assert!(is_retryable(Some(&err)));
        assert!(is_retryable(Some(&BotError::HttpStatus { status: 502 })));
    }

    #[test]
    fn cancellation_and_caller_errors_are_not_retryable() {
        assert!(!BotError::Cancelled.is_retryable());
        assert!(!BotError::HandlerRequired.is_retryable());
        let malformed = serde_json::from_str::<bool>("{").unwrap_err();
        assert!(
            !BotError::MalformedEnvelope {
                status: 200,
                source: malformed
            }
            .is_retryable()
        );
    }

    #[test]
    fn proxy_error_pages_are_retryable() {
        let html = |status| BotError::MalformedEnvelope {
            status,
            source: serde_json::from_str::<bool>("<html>").unwrap_err(),
        };
        assert!(html(502).is_retryable());
        assert!(html(429).is_retryable());
        assert!(is_retryable(Some(&html(504))));
        assert!(!html(404).is_retryable());
    }

    #[test]
    fn api_error_exposes_hints() {
        let err = ApiError {
            code: ErrorCode::new(429),
            message: "Too Many Requests: retry after 3".to_owned(),
            parameters: Some(ResponseParameters {
                migrate_to_chat_id: Some(-100123),
                retry_after: Some(3),
            }),
            response: None,
        };
        assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));
        assert_eq!(err.migrate_to_chat_id(), Some(-100123));
        assert_eq!(err.to_string(), "telegram: 429 Too Many Requests: retry after 3");
    }
}

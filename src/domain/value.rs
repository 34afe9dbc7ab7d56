use std::fmt;

use crate::domain::validation::ValidationError;

#[derive(Clone, PartialEq, Eq, Hash)]
/// Bot API token issued by `@BotFather`.
///
/// Invariant: non-empty after trimming. The token is part of every endpoint URL,
/// so `Debug` never prints it.
pub struct BotToken(String);

impl BotToken {
    /// Field name used in validation errors.
    pub const FIELD: &'static str = "token";

    /// Create a validated [`BotToken`].
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::Empty { field: Self::FIELD });
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Borrow the validated token.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BotToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BotToken(***)")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// `error_code` carried by a rejected response envelope.
///
/// The Bot API reuses HTTP status codes for its error codes.
pub struct ErrorCode(i32);

impl ErrorCode {
    /// Construct an error code from its integer representation.
    pub fn new(code: i32) -> Self {
        Self(code)
    }

    /// Get the integer code as returned by the API.
    pub fn as_i32(self) -> i32 {
        self.0
    }

    /// Map this code to a known variant, if one exists.
    pub fn known(self) -> Option<KnownErrorCode> {
        KnownErrorCode::from_code(self.0)
    }

    /// `429 Too Many Requests`.
    pub fn is_rate_limited(self) -> bool {
        self.0 == 429
    }

    /// Any code in `500..600`.
    pub fn is_server_error(self) -> bool {
        (500..600).contains(&self.0)
    }

    /// Returns `true` for rate limiting and server-side failures.
    pub fn is_retryable(self) -> bool {
        self.is_rate_limited() || self.is_server_error()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
/// Error codes the Bot API is documented to return.
pub enum KnownErrorCode {
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    PayloadTooLarge,
    TooManyRequests,
    InternalServerError,
    BadGateway,
}

impl KnownErrorCode {
    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            400 => Self::BadRequest,
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            409 => Self::Conflict,
            413 => Self::PayloadTooLarge,
            429 => Self::TooManyRequests,
            500 => Self::InternalServerError,
            502 => Self::BadGateway,
            _ => return None,
        })
    }

    pub fn code(self) -> i32 {
        match self {
            Self::BadRequest => 400,
            Self::Unauthorized => 401,
            Self::Forbidden => 403,
            Self::NotFound => 404,
            Self::Conflict => 409,
            Self::PayloadTooLarge => 413,
            Self::TooManyRequests => 429,
            Self::InternalServerError => 500,
            Self::BadGateway => 502,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_trims_and_rejects_blank() {
        assert_eq!(BotToken::new(" 123:abc ").unwrap().as_str(), "123:abc");
        assert!(matches!(
            BotToken::new("  "),
            Err(ValidationError::Empty {
                field: BotToken::FIELD
            })
        ));
    }

    #[test]
    fn token_debug_is_redacted() {
        let token = BotToken::new("123:secret").unwrap();
        assert!(!format!("{token:?}").contains("secret"));
    }

    #[test]
    fn error_code_classification() {
        assert!(ErrorCode::new(429).is_retryable());
        assert!(ErrorCode::new(500).is_retryable());
        assert!(ErrorCode::new(599).is_retryable());
        assert!(!ErrorCode::new(600).is_retryable());
        assert!(!ErrorCode::new(400).is_retryable());
        assert!(!ErrorCode::new(403).is_retryable());
    }

    #[test]
    fn known_error_code_round_trips_integer() {
        for code in [400, 401, 403, 404, 409, 413, 429, 500, 502] {
            let known = ErrorCode::new(code).known().unwrap();
            assert_eq!(known.code(), code);
        }
        assert_eq!(ErrorCode::new(418).known(), None);
    }
}

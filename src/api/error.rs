//! Factory API error types

use thiserror::Error;

/// Errors from the factory backend
#[derive(Error, Debug)]
pub enum ApiError {
    /// Transport-level request failure
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Request timed out")]
    Timeout,

    #[error("Factory backend unavailable")]
    Unavailable,

    /// Caller is not authorized (missing or expired token)
    #[error("Not authorized")]
    Unauthorized,

    #[error("Not found: {0}")]
    NotFound(String),

    /// Any other non-success status
    #[error("Backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response: {0}")]
    Decode(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ApiError {
    /// Classify a reqwest error the way callers care about
    pub(crate) fn from_request(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout
        } else if err.is_connect() {
            ApiError::Unavailable
        } else if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else {
            ApiError::Request(err)
        }
    }
}

/// Result type alias for factory API calls
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ApiError::Status {
            status: 500,
            body: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "Backend returned 500: boom");
        assert_eq!(ApiError::Unauthorized.to_string(), "Not authorized");
    }
}

//! Outcome classification for remote API calls

use std::time::Duration;
use thiserror::Error;

/// Non-success outcome of one remote call
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("Authentication failed: check the API token")]
    Auth,

    #[error("Resource not found")]
    NotFound,

    #[error("Client error {status}: {message}")]
    Client { status: u16, message: String },

    #[error("Server error {0}")]
    Server(u16),

    #[error("Rate limited by remote API")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Request timed out")]
    Timeout,

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Undecodable response body: {0}")]
    Decode(String),
}

impl ApiError {
    /// HTTP status behind the error, if a response was received
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::Auth => Some(401),
            ApiError::NotFound => Some(404),
            ApiError::Client { status, .. } => Some(*status),
            ApiError::Server(status) => Some(*status),
            ApiError::RateLimited { .. } => Some(429),
            ApiError::Timeout | ApiError::Connection(_) => None,
            ApiError::Decode(_) => None,
        }
    }

    /// Failures worth another attempt with backoff
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApiError::Server(_) | ApiError::Timeout | ApiError::Connection(_)
        )
    }
}

/// Map a non-2xx status to its error, `None` for success
pub fn classify_status(status: u16, retry_after: Option<&str>, body: &str) -> Option<ApiError> {
    match status {
        200..=299 => None,
        401 => Some(ApiError::Auth),
        404 => Some(ApiError::NotFound),
        429 => Some(ApiError::RateLimited {
            retry_after: retry_after.and_then(parse_retry_after),
        }),
        400..=499 => Some(ApiError::Client {
            status,
            message: body.chars().take(200).collect(),
        }),
        _ => Some(ApiError::Server(status)),
    }
}

/// `Retry-After` in delta-seconds form
fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

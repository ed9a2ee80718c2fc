//! Sync Error Types

use thiserror::Error;

use crate::client::ApiError;
use crate::domain::DomainError;
use crate::store::StoreError;

/// Failure of a sync operation
#[derive(Debug, Error)]
pub enum SyncError {
    /// Timeout, connection failure, 5xx or 429 after retries
    #[error("Temporary failure talking to Tesote: {0}")]
    Transient(String),

    #[error("Tesote rejected the API token; check the configuration")]
    PermanentAuth,

    /// Other 4xx, 404 or an undecodable body
    #[error("Tesote rejected the request: {0}")]
    PermanentClient(String),

    #[error("Request limit of {limit} calls per sync session reached")]
    LoopGuard { limit: u32 },

    #[error("Invalid data: {0}")]
    Validation(String),

    #[error("Tesote integration is not configured: {0}")]
    NotConfigured(String),

    /// Some lines of the batch could not be stored
    #[error("{failed} of {total} transactions could not be stored: {first_error}")]
    Partial {
        failed: usize,
        total: usize,
        first_error: String,
    },

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<ApiError> for SyncError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Auth => SyncError::PermanentAuth,
            ApiError::NotFound => SyncError::PermanentClient(err.to_string()),
            ApiError::Client { .. } | ApiError::Decode(_) => {
                SyncError::PermanentClient(err.to_string())
            }
            ApiError::Server(_)
            | ApiError::RateLimited { .. }
            | ApiError::Timeout
            | ApiError::Connection(_) => SyncError::Transient(err.to_string()),
        }
    }
}

impl SyncError {
    /// Short machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            SyncError::Transient(_) => "transient",
            SyncError::PermanentAuth => "auth_failed",
            SyncError::PermanentClient(_) => "request_rejected",
            SyncError::LoopGuard { .. } => "request_limit",
            SyncError::Validation(_) => "validation",
            SyncError::NotConfigured(_) => "not_configured",
            SyncError::Partial { .. } => "partial_sync",
            SyncError::Domain(_) => "domain",
            SyncError::Store(_) => "store",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_mapping() {
        assert!(matches!(SyncError::from(ApiError::Auth), SyncError::PermanentAuth));
        assert!(matches!(
            SyncError::from(ApiError::NotFound),
            SyncError::PermanentClient(_)
        ));
        assert!(matches!(
            SyncError::from(ApiError::Server(500)),
            SyncError::Transient(_)
        ));
        assert!(matches!(
            SyncError::from(ApiError::RateLimited { retry_after: None }),
            SyncError::Transient(_)
        ));
        assert!(matches!(
            SyncError::from(ApiError::Decode("eof".into())),
            SyncError::PermanentClient(_)
        ));
    }

    #[test]
    fn test_partial_message() {
        let err = SyncError::Partial {
            failed: 1,
            total: 3,
            first_error: "t2: disk full".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "1 of 3 transactions could not be stored: t2: disk full"
        );
        assert_eq!(err.code(), "partial_sync");
    }
}

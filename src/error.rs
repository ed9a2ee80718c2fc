//! Error handling module
//!
//! Centralized error types and HTTP response conversion.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::domain::DomainError;
use crate::store::StoreError;
use crate::sync::SyncError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("Missing required header: {0}")]
    MissingHeader(String),

    // Sync errors, including domain and store failures
    #[error(transparent)]
    Sync(#[from] SyncError),

    // Server errors (5xx)
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        AppError::Sync(SyncError::Domain(err))
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Sync(SyncError::Store(err))
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

fn domain_status(err: &DomainError) -> (StatusCode, &'static str) {
    match err {
        DomainError::CurrencyMismatch { .. } => {
            (StatusCode::UNPROCESSABLE_ENTITY, "currency_mismatch")
        }
        DomainError::AccountNotFound(_) => (StatusCode::NOT_FOUND, "account_not_found"),
        DomainError::JournalNotFound(_) => (StatusCode::NOT_FOUND, "journal_not_found"),
        DomainError::AccountNotMapped(_) => (StatusCode::CONFLICT, "account_not_mapped"),
        DomainError::AccountInactive(_) => (StatusCode::CONFLICT, "account_inactive"),
        DomainError::InvalidRecord(_) => (StatusCode::BAD_GATEWAY, "invalid_remote_record"),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, details) = match &self {
            // 400 Bad Request
            AppError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", Some(msg.clone()))
            }
            AppError::MissingHeader(header) => {
                (StatusCode::BAD_REQUEST, "missing_header", Some(header.clone()))
            }

            // 401 Unauthorized
            AppError::InvalidApiKey => (StatusCode::UNAUTHORIZED, "invalid_api_key", None),

            AppError::Sync(err) => match err {
                SyncError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "validation_error", Some(msg.clone()))
                }
                SyncError::Domain(domain_err) => {
                    let (status, code) = domain_status(domain_err);
                    (status, code, None)
                }
                SyncError::Store(StoreError::NotFound(what)) => {
                    (StatusCode::NOT_FOUND, "not_found", Some(what.clone()))
                }
                SyncError::Store(e) => {
                    tracing::error!("Store error: {:?}", e);
                    (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
                }
                SyncError::NotConfigured(_) => {
                    (StatusCode::SERVICE_UNAVAILABLE, "not_configured", None)
                }
                SyncError::PermanentAuth => {
                    (StatusCode::BAD_GATEWAY, "upstream_auth_failed", None)
                }
                SyncError::PermanentClient(_) => {
                    (StatusCode::BAD_GATEWAY, "upstream_rejected", None)
                }
                SyncError::Transient(_) => {
                    (StatusCode::SERVICE_UNAVAILABLE, "upstream_unavailable", None)
                }
                SyncError::LoopGuard { .. } => {
                    (StatusCode::SERVICE_UNAVAILABLE, "request_limit", None)
                }
                SyncError::Partial { .. } => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "partial_sync", None)
                }
            },

            // 500 Internal Server Error
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
            AppError::Config(e) => {
                tracing::error!("Config error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "config_error", None)
            }
        };

        let error = match &self {
            AppError::Sync(SyncError::Store(StoreError::Database(_))) => {
                "Database error".to_string()
            }
            _ => self.to_string(),
        };

        let body = ErrorResponse {
            error,
            error_code: error_code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

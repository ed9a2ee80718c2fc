//! API Middleware
//!
//! Admin authentication and request logging.

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use uuid::Uuid;

use crate::domain::SyncContext;

use super::AppState;

/// Header carrying an optional caller-chosen correlation id
pub const CORRELATION_HEADER: &str = "x-correlation-id";

fn unauthorized(message: &str, code: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "error": message,
            "error_code": code
        })),
    )
        .into_response()
}

/// Correlation id from the request, or a fresh one
pub fn correlation_id(headers: &HeaderMap) -> Uuid {
    headers
        .get(CORRELATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::new_v4)
}

/// MAC key used only to compare admin keys
const ADMIN_KEY_MAC_KEY: &[u8] = b"tesote-sync/admin-key";

fn admin_key_mac(key: &str) -> Option<Hmac<Sha256>> {
    let mut mac = Hmac::<Sha256>::new_from_slice(ADMIN_KEY_MAC_KEY).ok()?;
    mac.update(key.as_bytes());
    Some(mac)
}

/// Constant-time comparison through `verify_slice` on the keys' MACs
fn key_matches(provided: &str, expected: &str) -> bool {
    match (admin_key_mac(expected), admin_key_mac(provided)) {
        (Some(expected), Some(provided)) => {
            let tag = expected.finalize().into_bytes();
            provided.verify_slice(&tag).is_ok()
        }
        _ => false,
    }
}

// =========================================================================
// API Key Authentication Middleware
// =========================================================================

/// Check `X-API-Key` against the configured admin key and attach a manual
/// `SyncContext` to the request
pub async fn auth_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, Response> {
    let api_key = match headers.get("X-API-Key").and_then(|v| v.to_str().ok()) {
        Some(key) => key,
        None => return Err(unauthorized("Missing X-API-Key header", "missing_api_key")),
    };

    let Some(expected) = state.settings.admin_api_key.as_deref() else {
        tracing::warn!("Admin request rejected: ADMIN_API_KEY is not configured");
        return Err(unauthorized("Invalid API key", "invalid_api_key"));
    };

    if !key_matches(api_key, expected) {
        return Err(unauthorized("Invalid API key", "invalid_api_key"));
    }

    let context = SyncContext::manual(state.sync.settings().company_id)
        .with_correlation_id(correlation_id(&headers));
    request.extensions_mut().insert(context);

    Ok(next.run(request).await)
}

// =========================================================================
// mask_headers_for_logging
// =========================================================================

/// Headers that should be masked in logs
const SENSITIVE_HEADERS: &[&str] = &[
    "x-api-key",
    "authorization",
    "cookie",
    "set-cookie",
    "x-tesote-signature",
];

/// Mask sensitive headers for logging
pub fn mask_headers_for_logging(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let name_lower = name.as_str().to_lowercase();
            let masked_value = if SENSITIVE_HEADERS.contains(&name_lower.as_str()) {
                "[REDACTED]".to_string()
            } else {
                value.to_str().unwrap_or("[invalid utf8]").to_string()
            };
            (name.to_string(), masked_value)
        })
        .collect()
}

// =========================================================================
// Request Logging Middleware
// =========================================================================

/// Request logging middleware
pub async fn logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let version = request.version();

    let headers = mask_headers_for_logging(request.headers());

    let correlation_id = request
        .headers()
        .get(CORRELATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let start = std::time::Instant::now();

    tracing::info!(
        method = %method,
        uri = %uri,
        version = ?version,
        correlation_id = ?correlation_id,
        headers = ?headers,
        "Incoming request"
    );

    let response = next.run(request).await;

    let duration = start.elapsed();
    let status = response.status();

    tracing::info!(
        method = %method,
        uri = %uri,
        status = %status,
        duration_ms = %duration.as_millis(),
        correlation_id = ?correlation_id,
        "Request completed"
    );

    response
}

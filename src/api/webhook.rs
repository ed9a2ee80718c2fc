//! Inbound webhook routes
//!
//! The receiver reads the raw body so the signature is checked over the
//! exact bytes the remote side signed.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use uuid::Uuid;

use crate::webhook::{WebhookRejection, EVENT_HEADER, SIGNATURE_HEADER};

use super::AppState;

fn rejection_status(rejection: &WebhookRejection) -> StatusCode {
    match rejection {
        WebhookRejection::UnknownEndpoint => StatusCode::NOT_FOUND,
        WebhookRejection::MissingSignature | WebhookRejection::InvalidSignature => {
            StatusCode::FORBIDDEN
        }
        WebhookRejection::MissingEventType | WebhookRejection::MalformedPayload(_) => {
            StatusCode::BAD_REQUEST
        }
        WebhookRejection::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// POST /tesote/webhook/:endpoint_id
pub async fn receive_webhook(
    State(state): State<AppState>,
    Path(endpoint_id): Path<Uuid>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !state.settings.webhook_enabled {
        return Json(json!({ "status": "disabled" })).into_response();
    }

    let event = match state
        .verifier
        .verify(
            endpoint_id,
            header(&headers, SIGNATURE_HEADER),
            header(&headers, EVENT_HEADER),
            &body,
        )
        .await
    {
        Ok(event) => event,
        Err(rejection) => {
            let status = rejection_status(&rejection);
            if status.is_server_error() {
                tracing::error!(webhook_id = %endpoint_id, error = %rejection, "Webhook verification failed");
            } else {
                tracing::warn!(webhook_id = %endpoint_id, reason = %rejection, "Webhook rejected");
            }
            let message = match rejection {
                WebhookRejection::Store(_) => "Internal error processing webhook".to_string(),
                WebhookRejection::MalformedPayload(_) => "Malformed payload".to_string(),
                other => other.to_string(),
            };
            return (
                status,
                Json(json!({ "status": "error", "message": message })),
            )
                .into_response();
        }
    };

    match state.dispatcher.dispatch(&event).await {
        Ok(outcome) => Json(json!({ "status": "ok", "result": outcome })).into_response(),
        Err(e) => {
            tracing::error!(
                webhook_id = %endpoint_id,
                event = %event.kind,
                error = %e,
                "Webhook dispatch failed"
            );
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "status": "error",
                    "message": "Internal error processing webhook"
                })),
            )
                .into_response()
        }
    }
}

/// GET /tesote/webhook/test
pub async fn webhook_test(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "message": "Tesote webhook endpoint is reachable",
        "webhook_enabled": state.settings.webhook_enabled
    }))
}

//! Webhook signature verification
//!
//! Signatures are hex HMAC-SHA256 over the exact received bytes, keyed
//! with the endpoint secret.

use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{WebhookEndpoint, WebhookEventKind};
use crate::store::{StoreError, WebhookRepository};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-tesote-signature";
pub const EVENT_HEADER: &str = "x-tesote-event";

/// Why an inbound webhook was refused
#[derive(Debug, Error)]
pub enum WebhookRejection {
    #[error("Unknown or inactive webhook endpoint")]
    UnknownEndpoint,

    #[error("Missing signature")]
    MissingSignature,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Missing event type")]
    MissingEventType,

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Authenticated inbound event
#[derive(Debug, Clone)]
pub struct VerifiedEvent {
    pub endpoint: WebhookEndpoint,
    pub kind: WebhookEventKind,
    pub payload: Value,
}

/// Hex HMAC-SHA256 of `body` under `secret`
pub fn sign(secret: &str, body: &[u8]) -> String {
    // HMAC accepts keys of any length
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time check of a hex signature, optionally prefixed `sha256=`
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let signature = signature.trim();
    let signature = signature.strip_prefix("sha256=").unwrap_or(signature);
    let Ok(expected) = hex::decode(signature) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Checks the preconditions of an inbound webhook, in order
pub struct WebhookVerifier {
    webhooks: Arc<dyn WebhookRepository>,
}

impl WebhookVerifier {
    pub fn new(webhooks: Arc<dyn WebhookRepository>) -> Self {
        Self { webhooks }
    }

    pub async fn verify(
        &self,
        endpoint_id: Uuid,
        signature: Option<&str>,
        event_header: Option<&str>,
        body: &[u8],
    ) -> Result<VerifiedEvent, WebhookRejection> {
        let endpoint = self
            .webhooks
            .get(endpoint_id)
            .await?
            .filter(|e| e.active)
            .ok_or(WebhookRejection::UnknownEndpoint)?;

        let signature = signature
            .filter(|s| !s.trim().is_empty())
            .ok_or(WebhookRejection::MissingSignature)?;

        if !verify_signature(&endpoint.secret, body, signature) {
            return Err(WebhookRejection::InvalidSignature);
        }

        let payload: Value = serde_json::from_slice(body)
            .map_err(|e| WebhookRejection::MalformedPayload(e.to_string()))?;
        if !payload.is_object() {
            return Err(WebhookRejection::MalformedPayload(
                "payload is not a JSON object".to_string(),
            ));
        }

        let kind = event_header
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_string)
            .or_else(|| {
                payload
                    .get("event")
                    .and_then(Value::as_str)
                    .filter(|e| !e.trim().is_empty())
                    .map(str::to_string)
            })
            .map(|e| WebhookEventKind::from(e.as_str()))
            .ok_or(WebhookRejection::MissingEventType)?;

        Ok(VerifiedEvent {
            endpoint,
            kind,
            payload,
        })
    }
}

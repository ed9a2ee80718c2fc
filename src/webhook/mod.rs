//! Webhook Verifier & Dispatcher
//!
//! Inbound events are authenticated against the endpoint secret before any
//! side effect, then routed to the same sync path as manual invocations.

mod dispatch;
mod verify;

pub use dispatch::{DispatchOutcome, WebhookDispatcher};
pub use verify::{
    sign, verify_signature, VerifiedEvent, WebhookRejection, WebhookVerifier, EVENT_HEADER,
    SIGNATURE_HEADER,
};

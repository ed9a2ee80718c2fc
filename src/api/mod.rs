//! API module
//!
//! HTTP API endpoints and middleware.

pub mod middleware;
pub mod routes;
pub mod webhook;

use std::sync::Arc;

use axum::{middleware as axum_middleware, routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::sync::SyncService;
use crate::webhook::{WebhookDispatcher, WebhookVerifier};

pub use routes::create_router;

/// Settings the HTTP layer reads on every request
#[derive(Debug, Clone, Default)]
pub struct ApiSettings {
    /// Expected `X-API-Key`; admin routes reject everything when unset
    pub admin_api_key: Option<String>,
    pub webhook_enabled: bool,
}

impl From<&Config> for ApiSettings {
    fn from(config: &Config) -> Self {
        Self {
            admin_api_key: config.admin_api_key.clone(),
            webhook_enabled: config.tesote.webhook_enabled,
        }
    }
}

/// Shared state of every handler
#[derive(Clone)]
pub struct AppState {
    pub sync: Arc<SyncService>,
    pub verifier: Arc<WebhookVerifier>,
    pub dispatcher: Arc<WebhookDispatcher>,
    pub settings: Arc<ApiSettings>,
}

impl AppState {
    pub fn new(sync: Arc<SyncService>, settings: ApiSettings) -> Self {
        let verifier = WebhookVerifier::new(sync.repositories().webhooks.clone());
        let dispatcher = WebhookDispatcher::new(sync.clone());
        Self {
            sync,
            verifier: Arc::new(verifier),
            dispatcher: Arc::new(dispatcher),
            settings: Arc::new(settings),
        }
    }
}

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // Axum layers are applied in reverse order (last added = first executed)
    // Order: logging -> auth -> handler
    let protected_routes = create_router()
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ))
        .layer(axum_middleware::from_fn(middleware::logging_middleware));

    // The receiver authenticates by signature, the reachability check by admin key
    let webhook_routes = Router::new()
        .route(
            "/test",
            get(webhook::webhook_test).layer(axum_middleware::from_fn_with_state(
                state.clone(),
                middleware::auth_middleware,
            )),
        )
        .route("/:endpoint_id", axum::routing::post(webhook::receive_webhook))
        .layer(axum_middleware::from_fn(middleware::logging_middleware));

    Router::new()
        // Health check (no auth)
        .route("/health", get(health_check))
        // Protected API routes
        .nest("/api/v1", protected_routes)
        .nest("/tesote/webhook", webhook_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

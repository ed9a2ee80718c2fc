//! API Routes
//!
//! Admin endpoints over the sync service. Every handler receives the manual
//! `SyncContext` attached by the auth middleware, so failures come back to
//! the operator as JSON errors.

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    routing::{delete, get, patch, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::domain::{MappedAccount, MinorUnits, SyncContext, WebhookEndpoint, WebhookSubscriptions};
use crate::error::{AppError, AppResult};
use crate::sync::{AccountSyncReport, MappingUpdate, RefreshReport, SyncAllReport};

use super::AppState;

// =========================================================================
// Request/Response types
// =========================================================================

#[derive(Debug, Serialize)]
pub struct AccountResponse {
    #[serde(flatten)]
    pub account: MappedAccount,
    pub display_name: String,
    /// Balance at the currency scale
    pub balance: Decimal,
}

impl From<MappedAccount> for AccountResponse {
    fn from(account: MappedAccount) -> Self {
        Self {
            display_name: account.display_name(),
            balance: account.remote.balance.to_decimal(account.currency()),
            account,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AccountsListResponse {
    pub accounts: Vec<AccountResponse>,
    pub total: usize,
}

#[derive(Debug, Default, Deserialize)]
pub struct SyncQuery {
    /// Date window for an account without cursor
    #[serde(default)]
    pub days: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub account_id: Uuid,
    pub balance_cents: MinorUnits,
    pub balance: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct RegisterWebhookRequest {
    /// Publicly reachable base URL of this service
    pub public_base_url: String,
    #[serde(default)]
    pub subscriptions: Option<WebhookSubscriptions>,
}

#[derive(Debug, Serialize)]
pub struct RegisterWebhookResponse {
    #[serde(flatten)]
    pub endpoint: WebhookEndpoint,
    pub url: String,
    /// Returned once, at registration
    pub secret: String,
}

// =========================================================================
// API Router
// =========================================================================

/// Create the admin API router
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/connection/test", post(test_connection))
        .route("/accounts", get(list_accounts))
        .route("/accounts/refresh", post(refresh_accounts))
        .route("/accounts/:account_id", patch(update_account))
        .route("/accounts/:account_id/sync", post(sync_account))
        .route("/accounts/:account_id/balance/refresh", post(refresh_balance))
        .route("/sync", post(sync_all))
        .route("/webhooks", post(register_webhook))
        .route("/webhooks/:webhook_id", delete(delete_webhook))
}

// =========================================================================
// POST /connection/test
// =========================================================================

async fn test_connection(
    State(state): State<AppState>,
    Extension(context): Extension<SyncContext>,
) -> AppResult<Json<Value>> {
    state.sync.test_connection(&context).await?;
    Ok(Json(json!({
        "status": "ok",
        "correlation_id": context.correlation_id
    })))
}

// =========================================================================
// Accounts
// =========================================================================

async fn list_accounts(
    State(state): State<AppState>,
    Extension(context): Extension<SyncContext>,
) -> AppResult<Json<AccountsListResponse>> {
    let accounts: Vec<AccountResponse> = state
        .sync
        .list_accounts(context.company_id)
        .await?
        .into_iter()
        .map(AccountResponse::from)
        .collect();

    Ok(Json(AccountsListResponse {
        total: accounts.len(),
        accounts,
    }))
}

async fn refresh_accounts(
    State(state): State<AppState>,
    Extension(context): Extension<SyncContext>,
) -> AppResult<Json<RefreshReport>> {
    Ok(Json(state.sync.refresh_accounts(&context).await?))
}

async fn update_account(
    State(state): State<AppState>,
    Path(account_id): Path<Uuid>,
    Json(request): Json<MappingUpdate>,
) -> AppResult<Json<AccountResponse>> {
    let account = state.sync.update_mapping(account_id, request).await?;
    Ok(Json(account.into()))
}

async fn sync_account(
    State(state): State<AppState>,
    Extension(context): Extension<SyncContext>,
    Path(account_id): Path<Uuid>,
    Query(query): Query<SyncQuery>,
) -> AppResult<Json<AccountSyncReport>> {
    if matches!(query.days, Some(days) if days < 1) {
        return Err(AppError::InvalidRequest("days must be at least 1".to_string()));
    }

    let report = state
        .sync
        .sync_account(&context, account_id, query.days)
        .await?;
    Ok(Json(report))
}

async fn refresh_balance(
    State(state): State<AppState>,
    Extension(context): Extension<SyncContext>,
    Path(account_id): Path<Uuid>,
) -> AppResult<Json<BalanceResponse>> {
    let balance = state.sync.refresh_balance(&context, account_id).await?;
    let account = state.sync.get_account(account_id).await?;

    Ok(Json(BalanceResponse {
        account_id,
        balance_cents: balance,
        balance: balance.to_decimal(account.currency()),
    }))
}

// =========================================================================
// POST /sync
// =========================================================================

async fn sync_all(
    State(state): State<AppState>,
    Extension(context): Extension<SyncContext>,
) -> AppResult<Json<SyncAllReport>> {
    Ok(Json(state.sync.sync_all(&context).await?))
}

// =========================================================================
// Webhook registration
// =========================================================================

async fn register_webhook(
    State(state): State<AppState>,
    Extension(context): Extension<SyncContext>,
    Json(request): Json<RegisterWebhookRequest>,
) -> AppResult<(StatusCode, Json<RegisterWebhookResponse>)> {
    let base = request.public_base_url.trim();
    if !(base.starts_with("https://") || base.starts_with("http://")) {
        return Err(AppError::InvalidRequest(
            "public_base_url must be an http(s) URL".to_string(),
        ));
    }

    let endpoint = state
        .sync
        .register_webhook(&context, base, request.subscriptions.unwrap_or_default())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterWebhookResponse {
            url: format!("{}/tesote/webhook/{}", base.trim_end_matches('/'), endpoint.id),
            secret: endpoint.secret.clone(),
            endpoint,
        }),
    ))
}

async fn delete_webhook(
    State(state): State<AppState>,
    Extension(context): Extension<SyncContext>,
    Path(webhook_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state.sync.delete_webhook(&context, webhook_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

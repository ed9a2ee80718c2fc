//! Routing of verified events to the sync service

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{MinorUnits, SyncContext, WebhookEventKind};
use crate::sync::{AccountSyncReport, RefreshReport, SyncError, SyncService};

use super::VerifiedEvent;

/// Window of a webhook-triggered sync for an account without cursor.
/// A cursored account resumes after its cursor and this window is unused.
const WEBHOOK_SYNC_DAYS: i64 = 1;

/// What a dispatched event did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Synced(AccountSyncReport),
    AccountsRefreshed(RefreshReport),
    BalanceUpdated { account_id: Uuid, balance: MinorUnits },
    Ignored { reason: String },
}

impl DispatchOutcome {
    fn ignored(reason: impl Into<String>) -> Self {
        DispatchOutcome::Ignored {
            reason: reason.into(),
        }
    }
}

pub struct WebhookDispatcher {
    sync: Arc<SyncService>,
}

impl WebhookDispatcher {
    pub fn new(sync: Arc<SyncService>) -> Self {
        Self { sync }
    }

    /// Count the event on its endpoint, then act on it if subscribed
    pub async fn dispatch(&self, event: &VerifiedEvent) -> Result<DispatchOutcome, SyncError> {
        self.sync
            .repositories()
            .webhooks
            .record_event(event.endpoint.id, Utc::now())
            .await?;

        let ctx = SyncContext::webhook(self.sync.settings().company_id);

        tracing::info!(
            webhook_id = %event.endpoint.id,
            event = %event.kind,
            correlation_id = %ctx.correlation_id,
            "Webhook received"
        );

        if !event.endpoint.subscriptions.accepts(&event.kind) {
            return Ok(DispatchOutcome::ignored(format!(
                "not subscribed to {}",
                event.kind
            )));
        }

        match &event.kind {
            WebhookEventKind::TransactionCreated => {
                self.on_transaction_created(&ctx, &event.payload).await
            }
            WebhookEventKind::AccountUpdated => {
                tracing::debug!(account = ?account_ref(&event.payload, true), "Refreshing accounts");
                let report = self.sync.refresh_accounts(&ctx).await?;
                Ok(DispatchOutcome::AccountsRefreshed(report))
            }
            WebhookEventKind::BalanceUpdated => self.on_balance_updated(&ctx, &event.payload).await,
            WebhookEventKind::Other(kind) => {
                Ok(DispatchOutcome::ignored(format!("unknown event {}", kind)))
            }
        }
    }

    async fn on_transaction_created(
        &self,
        ctx: &SyncContext,
        payload: &Value,
    ) -> Result<DispatchOutcome, SyncError> {
        let Some(external_id) = account_ref(payload, false) else {
            return Ok(DispatchOutcome::ignored("no account id in payload"));
        };
        let Some(account) = self.sync.find_account(ctx.company_id, &external_id).await? else {
            return Ok(DispatchOutcome::ignored(format!("unknown account {}", external_id)));
        };
        if !account.is_syncable() {
            tracing::info!(account_id = %account.id, "Webhook for inactive or unmapped account ignored");
            return Ok(DispatchOutcome::ignored("account is inactive or unmapped"));
        }

        let report = self
            .sync
            .sync_account(ctx, account.id, Some(WEBHOOK_SYNC_DAYS))
            .await?;
        Ok(DispatchOutcome::Synced(report))
    }

    async fn on_balance_updated(
        &self,
        ctx: &SyncContext,
        payload: &Value,
    ) -> Result<DispatchOutcome, SyncError> {
        let Some(external_id) = account_ref(payload, false) else {
            return Ok(DispatchOutcome::ignored("no account id in payload"));
        };
        let Some(balance) = field(payload, "balance_cents").and_then(Value::as_i64) else {
            return Ok(DispatchOutcome::ignored("no balance in payload"));
        };
        let Some(account) = self.sync.find_account(ctx.company_id, &external_id).await? else {
            return Ok(DispatchOutcome::ignored(format!("unknown account {}", external_id)));
        };

        let balance = MinorUnits::new(balance);
        self.sync.apply_balance(account.id, balance).await?;
        Ok(DispatchOutcome::BalanceUpdated {
            account_id: account.id,
            balance,
        })
    }
}

/// Top-level field, else the same field inside `data`
fn field<'a>(payload: &'a Value, key: &str) -> Option<&'a Value> {
    payload
        .get(key)
        .or_else(|| payload.get("data").and_then(|d| d.get(key)))
}

/// Remote account id of an event; `data.id` is accepted for account events
fn account_ref(payload: &Value, account_event: bool) -> Option<String> {
    let value = field(payload, "account_id").or_else(|| {
        if account_event {
            payload.get("data").and_then(|d| d.get("id"))
        } else {
            None
        }
    })?;
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

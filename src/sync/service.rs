//! Sync service
//!
//! Every operation opens its own governor session. Manual invocations get
//! failures back as errors; scheduled and webhook invocations record them on
//! the account and carry on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use crate::client::{ApiRequest, TesoteClient};
use crate::config::TesoteConfig;
use crate::domain::{
    DomainError, MappedAccount, MinorUnits, RemoteTransaction, SyncContext, SyncCursor,
    SyncStatus, WebhookEndpoint, WebhookSubscriptions,
};
use crate::fetch::{
    next_cursor, parse_balance, FetchEngine, FetchPolicy, MAX_TRANSACTIONS_PER_SYNC,
};
use crate::governor::{GovernorPolicy, RateGovernor};
use crate::reconcile::{ReconcileReport, ReconciliationEngine};
use crate::store::{AccountMapping, Repositories, StoreError, SyncStateUpdate};

use super::SyncError;

/// Width of `tesote_accounts.statement_prefix`
const MAX_STATEMENT_PREFIX_LEN: usize = 20;

/// Tunables of the sync service
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Company whose accounts are synchronized
    pub company_id: Uuid,
    /// Date window of a sync without cursor
    pub sync_days: i64,
    pub governor: GovernorPolicy,
    pub fetch: FetchPolicy,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            company_id: Uuid::nil(),
            sync_days: 7,
            governor: GovernorPolicy::default(),
            fetch: FetchPolicy::default(),
        }
    }
}

impl From<&TesoteConfig> for SyncSettings {
    fn from(config: &TesoteConfig) -> Self {
        Self {
            company_id: config.company_id,
            sync_days: config.sync_days,
            fetch: FetchPolicy {
                max_transactions: config.max_transactions.min(MAX_TRANSACTIONS_PER_SYNC),
                ..FetchPolicy::default()
            },
            ..Self::default()
        }
    }
}

/// Outcome of an account-list refresh
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    pub discovered: usize,
    pub updated: usize,
}

/// Outcome of one account sync
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountSyncReport {
    pub account_id: Uuid,
    pub status: SyncStatus,
    pub fetched: usize,
    pub created: usize,
    pub duplicates: usize,
    pub failed: usize,
    pub cursor: Option<SyncCursor>,
    pub error: Option<String>,
}

impl AccountSyncReport {
    fn from_reconcile(
        account_id: Uuid,
        fetched: usize,
        report: &ReconcileReport,
        cursor: Option<SyncCursor>,
    ) -> Self {
        Self {
            account_id,
            status: SyncStatus::Success,
            fetched,
            created: report.created,
            duplicates: report.duplicates,
            failed: report.failures.len(),
            cursor,
            error: None,
        }
    }

    fn failed(account_id: Uuid, error: &SyncError) -> Self {
        Self {
            account_id,
            status: SyncStatus::Error,
            fetched: 0,
            created: 0,
            duplicates: 0,
            failed: 0,
            cursor: None,
            error: Some(error.to_string()),
        }
    }
}

/// Outcome of a sync over all syncable accounts
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncAllReport {
    pub accounts: Vec<AccountSyncReport>,
    pub succeeded: usize,
    pub failed: usize,
    pub completed_at: DateTime<Utc>,
}

/// Operator edit of an account mapping; `None` fields are left as they are
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MappingUpdate {
    pub journal_id: Option<Uuid>,
    pub statement_prefix: Option<String>,
    pub active: Option<bool>,
}

struct BatchOutcome {
    fetched: usize,
    report: ReconcileReport,
    cursor: Option<SyncCursor>,
}

pub struct SyncService {
    client: Option<Arc<TesoteClient>>,
    repos: Repositories,
    fetch: FetchEngine,
    engine: ReconciliationEngine,
    settings: SyncSettings,
}

impl SyncService {
    /// `client` is `None` when no API token is configured
    pub fn new(client: Option<Arc<TesoteClient>>, repos: Repositories, settings: SyncSettings) -> Self {
        let engine = ReconciliationEngine::new(repos.statements.clone(), repos.partners.clone());
        Self {
            client,
            fetch: FetchEngine::new(settings.fetch.clone()),
            engine,
            repos,
            settings,
        }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub fn repositories(&self) -> &Repositories {
        &self.repos
    }

    pub fn is_configured(&self) -> bool {
        self.client.is_some()
    }

    fn session(&self) -> Result<RateGovernor, SyncError> {
        let client = self
            .client
            .clone()
            .ok_or_else(|| SyncError::NotConfigured("TESOTE_API_TOKEN is not set".to_string()))?;
        Ok(RateGovernor::new(client, self.settings.governor.clone()))
    }

    // =========================================================================
    // Connection and accounts
    // =========================================================================

    /// Authenticated round trip with the shortest timeout
    pub async fn test_connection(&self, ctx: &SyncContext) -> Result<(), SyncError> {
        let mut governor = self.session()?;
        governor.reset_session();
        governor.execute(&ApiRequest::connection_test(), ctx).await?;

        tracing::info!(correlation_id = %ctx.correlation_id, "Tesote connection test succeeded");
        Ok(())
    }

    /// Create or refresh a MappedAccount per remote account. Mappings and
    /// cursors are never touched.
    pub async fn refresh_accounts(&self, ctx: &SyncContext) -> Result<RefreshReport, SyncError> {
        let mut governor = self.session()?;
        let remote_accounts = self.fetch.accounts(&mut governor, ctx).await?;

        let mut report = RefreshReport::default();
        for remote in remote_accounts {
            match self
                .repos
                .accounts
                .find_by_external_id(ctx.company_id, &remote.external_id)
                .await?
            {
                Some(existing) => {
                    self.repos
                        .accounts
                        .update_snapshot(existing.id, &remote)
                        .await?;
                    report.updated += 1;
                }
                None => {
                    let account = MappedAccount::discovered(ctx.company_id, remote);
                    self.repos.accounts.create(&account).await?;
                    tracing::info!(
                        account_id = %account.id,
                        name = %account.display_name(),
                        "Discovered Tesote account"
                    );
                    report.discovered += 1;
                }
            }
        }

        tracing::info!(
            discovered = report.discovered,
            updated = report.updated,
            trigger = %ctx.trigger,
            correlation_id = %ctx.correlation_id,
            "Account list refreshed"
        );
        Ok(report)
    }

    pub async fn list_accounts(&self, company_id: Uuid) -> Result<Vec<MappedAccount>, SyncError> {
        Ok(self.repos.accounts.list(company_id).await?)
    }

    pub async fn get_account(&self, id: Uuid) -> Result<MappedAccount, SyncError> {
        self.repos
            .accounts
            .get(id)
            .await?
            .ok_or_else(|| SyncError::Domain(DomainError::AccountNotFound(id.to_string())))
    }

    pub async fn find_account(
        &self,
        company_id: Uuid,
        external_id: &str,
    ) -> Result<Option<MappedAccount>, SyncError> {
        Ok(self
            .repos
            .accounts
            .find_by_external_id(company_id, external_id)
            .await?)
    }

    /// Apply an operator mapping edit, enforcing the currency invariant
    pub async fn update_mapping(
        &self,
        id: Uuid,
        update: MappingUpdate,
    ) -> Result<MappedAccount, SyncError> {
        let mut account = self.get_account(id).await?;

        if let Some(journal_id) = update.journal_id {
            let journal = self
                .repos
                .journals
                .get(journal_id)
                .await?
                .ok_or_else(|| DomainError::JournalNotFound(journal_id.to_string()))?;
            account.map_to_journal(&journal)?;
        }
        if let Some(prefix) = update.statement_prefix {
            if prefix.trim().is_empty() {
                return Err(SyncError::Validation(
                    "statement prefix must not be empty".to_string(),
                ));
            }
            if prefix.chars().count() > MAX_STATEMENT_PREFIX_LEN {
                return Err(SyncError::Validation(format!(
                    "statement prefix must be at most {} characters",
                    MAX_STATEMENT_PREFIX_LEN
                )));
            }
            account.statement_prefix = prefix;
        }
        if let Some(active) = update.active {
            account.active = active;
        }

        self.repos
            .accounts
            .update_mapping(
                id,
                &AccountMapping {
                    journal_id: account.journal_id,
                    statement_prefix: account.statement_prefix.clone(),
                    active: account.active,
                },
            )
            .await?;

        tracing::info!(
            account_id = %id,
            journal_id = ?account.journal_id,
            active = account.active,
            "Account mapping updated"
        );
        Ok(account)
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Fetch and reconcile one account. `days` overrides the configured
    /// window when the account has no cursor yet.
    pub async fn sync_account(
        &self,
        ctx: &SyncContext,
        account_id: Uuid,
        days: Option<i64>,
    ) -> Result<AccountSyncReport, SyncError> {
        let account = self.get_account(account_id).await?;

        self.repos
            .accounts
            .update_sync_state(account.id, &SyncStateUpdate::syncing())
            .await?;

        let outcome = self.sync_batch(ctx, &account, days).await;
        let now = Utc::now();

        let error = match outcome {
            Ok(batch) if batch.report.is_complete() => {
                self.repos
                    .accounts
                    .update_sync_state(
                        account.id,
                        &SyncStateUpdate::succeeded(batch.cursor.clone(), now),
                    )
                    .await?;
                tracing::info!(
                    account_id = %account.id,
                    fetched = batch.fetched,
                    created = batch.report.created,
                    duplicates = batch.report.duplicates,
                    trigger = %ctx.trigger,
                    correlation_id = %ctx.correlation_id,
                    "Account sync completed"
                );
                return Ok(AccountSyncReport::from_reconcile(
                    account.id,
                    batch.fetched,
                    &batch.report,
                    batch.cursor,
                ));
            }
            Ok(batch) => {
                let first_error = batch
                    .report
                    .failures
                    .first()
                    .map(|f| format!("{}: {}", f.external_id, f.error))
                    .unwrap_or_default();
                let error = SyncError::Partial {
                    failed: batch.report.failures.len(),
                    total: batch.report.total(),
                    first_error,
                };
                if !ctx.trigger.surfaces_errors() {
                    self.record_failure(&account, &error, now).await?;
                    let mut report = AccountSyncReport::from_reconcile(
                        account.id,
                        batch.fetched,
                        &batch.report,
                        None,
                    );
                    report.status = SyncStatus::Error;
                    report.error = Some(error.to_string());
                    return Ok(report);
                }
                error
            }
            Err(error) => error,
        };

        self.record_failure(&account, &error, now).await?;
        if ctx.trigger.surfaces_errors() {
            Err(error)
        } else {
            Ok(AccountSyncReport::failed(account.id, &error))
        }
    }

    async fn record_failure(
        &self,
        account: &MappedAccount,
        error: &SyncError,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        tracing::error!(
            account_id = %account.id,
            error = %error,
            error_code = error.code(),
            "Account sync failed"
        );
        self.repos
            .accounts
            .update_sync_state(account.id, &SyncStateUpdate::failed(error.to_string(), at))
            .await
    }

    async fn sync_batch(
        &self,
        ctx: &SyncContext,
        account: &MappedAccount,
        days: Option<i64>,
    ) -> Result<BatchOutcome, SyncError> {
        if !account.active {
            return Err(DomainError::AccountInactive(account.display_name()).into());
        }
        let journal_id = account.require_journal()?;
        let journal = self
            .repos
            .journals
            .get(journal_id)
            .await?
            .ok_or_else(|| DomainError::JournalNotFound(journal_id.to_string()))?;

        let mut governor = self.session()?;
        let window = self.fetch.policy().plan_window(
            &account.cursor,
            days.unwrap_or(self.settings.sync_days),
            ctx.today,
        );
        let transactions: Vec<RemoteTransaction> = self
            .fetch
            .transactions(&mut governor, ctx, account, &window)
            .await?;

        let report = self
            .engine
            .reconcile(ctx, account, &journal, &transactions)
            .await?;

        Ok(BatchOutcome {
            fetched: transactions.len(),
            cursor: next_cursor(&transactions),
            report,
        })
    }

    /// Sync every active mapped account, one after another. A failing
    /// account does not stop the loop.
    pub async fn sync_all(&self, ctx: &SyncContext) -> Result<SyncAllReport, SyncError> {
        let accounts = self.repos.accounts.list_syncable(ctx.company_id).await?;

        let mut reports = Vec::with_capacity(accounts.len());
        for account in accounts {
            let report = match self.sync_account(ctx, account.id, None).await {
                Ok(report) => report,
                Err(e) => AccountSyncReport::failed(account.id, &e),
            };
            reports.push(report);
        }

        let failed = reports
            .iter()
            .filter(|r| r.status == SyncStatus::Error)
            .count();
        let report = SyncAllReport {
            succeeded: reports.len() - failed,
            failed,
            accounts: reports,
            completed_at: Utc::now(),
        };

        tracing::info!(
            succeeded = report.succeeded,
            failed = report.failed,
            trigger = %ctx.trigger,
            correlation_id = %ctx.correlation_id,
            "Sync of all accounts finished"
        );
        Ok(report)
    }

    // =========================================================================
    // Balances
    // =========================================================================

    /// Pull the current balance of one account
    pub async fn refresh_balance(
        &self,
        ctx: &SyncContext,
        account_id: Uuid,
    ) -> Result<MinorUnits, SyncError> {
        let account = self.get_account(account_id).await?;
        let mut governor = self.session()?;

        let body = governor
            .execute(
                &ApiRequest::balance(account.external_id()).for_account(account.id),
                ctx,
            )
            .await?;
        let balance = parse_balance(&body, account.currency()).ok_or_else(|| {
            SyncError::PermanentClient("balance response without balance".to_string())
        })?;

        self.apply_balance(account.id, balance).await?;
        Ok(balance)
    }

    /// Store a balance reported by the remote side
    pub async fn apply_balance(&self, account_id: Uuid, balance: MinorUnits) -> Result<(), SyncError> {
        self.repos.accounts.update_balance(account_id, balance).await?;
        tracing::info!(account_id = %account_id, balance = %balance, "Account balance updated");
        Ok(())
    }

    // =========================================================================
    // Webhook registration
    // =========================================================================

    /// Register a receiver under `public_base_url` with the remote API and
    /// store it locally.
    pub async fn register_webhook(
        &self,
        ctx: &SyncContext,
        public_base_url: &str,
        subscriptions: WebhookSubscriptions,
    ) -> Result<WebhookEndpoint, SyncError> {
        let events = subscriptions.event_names();
        if events.is_empty() {
            return Err(SyncError::Validation(
                "subscribe to at least one event".to_string(),
            ));
        }

        let mut endpoint = WebhookEndpoint::new(subscriptions);
        let url = format!(
            "{}/tesote/webhook/{}",
            public_base_url.trim_end_matches('/'),
            endpoint.id
        );

        let mut governor = self.session()?;
        let body = governor
            .execute(
                &ApiRequest::register_webhook(&url, &events, &endpoint.secret),
                ctx,
            )
            .await?;
        endpoint.remote_id = remote_id(&body);

        self.repos.webhooks.create(&endpoint).await?;

        tracing::info!(
            webhook_id = %endpoint.id,
            remote_id = ?endpoint.remote_id,
            url = %url,
            "Webhook registered"
        );
        Ok(endpoint)
    }

    /// Remove the remote registration and deactivate the local endpoint
    pub async fn delete_webhook(&self, ctx: &SyncContext, id: Uuid) -> Result<(), SyncError> {
        let endpoint = self
            .repos
            .webhooks
            .get(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("webhook {}", id)))?;

        if let Some(remote_id) = &endpoint.remote_id {
            let mut governor = self.session()?;
            governor
                .execute(&ApiRequest::delete_webhook(remote_id), ctx)
                .await?;
        }

        self.repos.webhooks.set_remote_id(id, None).await?;
        self.repos.webhooks.set_active(id, false).await?;

        tracing::info!(webhook_id = %id, "Webhook deleted");
        Ok(())
    }
}

fn remote_id(body: &Value) -> Option<String> {
    let id = body
        .get("id")
        .or_else(|| body.get("data").and_then(|d| d.get("id")))?;
    match id {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::TracingLogSink;
    use crate::client::testing::ScriptedTransport;
    use crate::client::ApiError;
    use crate::domain::{Journal, RemoteAccount};
    use crate::store::{AccountRepository, InMemoryStore, WebhookRepository};
    use chrono::NaiveDate;
    use serde_json::json;

    struct Harness {
        store: Arc<InMemoryStore>,
        transport: Arc<ScriptedTransport>,
        service: SyncService,
        journal: Journal,
    }

    fn harness(fallback: Result<Value, ApiError>) -> Harness {
        let store = Arc::new(InMemoryStore::new());
        let transport = Arc::new(ScriptedTransport::new(fallback));
        let client = Arc::new(TesoteClient::new(transport.clone(), Arc::new(TracingLogSink)));
        let service = SyncService::new(
            Some(client),
            Repositories::from_store(store.clone()),
            SyncSettings::default(),
        );
        let journal = Journal {
            id: Uuid::new_v4(),
            company_id: Uuid::nil(),
            name: "Bank USD".to_string(),
            currency: "USD".to_string(),
        };
        store.add_journal(journal.clone());
        Harness {
            store,
            transport,
            service,
            journal,
        }
    }

    async fn mapped_account(h: &Harness) -> MappedAccount {
        let mut account = MappedAccount::discovered(
            Uuid::nil(),
            RemoteAccount {
                external_id: "A1".to_string(),
                name: None,
                bank_name: "Bank".to_string(),
                masked_account: "1234".to_string(),
                currency: "USD".to_string(),
                legal_entity_id: None,
                legal_entity_name: String::new(),
                balance: MinorUnits::zero(),
            },
        );
        account.journal_id = Some(h.journal.id);
        AccountRepository::create(h.store.as_ref(), &account).await.unwrap();
        account
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 5).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_keeps_mapping() {
        let h = harness(Ok(json!([])));
        let account = mapped_account(&h).await;
        h.transport.push(Ok(json!([
            {"id": "A1", "bank_name": "Renamed", "currency": "USD", "balance_cents": 700},
            {"id": "A2", "bank_name": "Other", "currency": "USD"}
        ])));
        let ctx = SyncContext::manual(Uuid::nil());

        let report = h.service.refresh_accounts(&ctx).await.unwrap();

        assert_eq!(report, RefreshReport { discovered: 1, updated: 1 });
        let refreshed = h.service.get_account(account.id).await.unwrap();
        assert_eq!(refreshed.remote.bank_name, "Renamed");
        assert_eq!(refreshed.journal_id, Some(h.journal.id));
        assert_eq!(h.service.list_accounts(Uuid::nil()).await.unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_batch_keeps_cursor() {
        let h = harness(Ok(json!([])));
        let account = mapped_account(&h).await;
        h.store.fail_lines_for("t2");
        h.transport.push(Ok(json!([
            {"id": "t1", "date": "2024-01-01", "amount_cents": 100, "type": "credit"},
            {"id": "t2", "date": "2024-01-02", "amount_cents": 100, "type": "credit"}
        ])));
        let ctx = SyncContext::scheduled(Uuid::nil()).with_today(today());

        let report = h.service.sync_account(&ctx, account.id, None).await.unwrap();

        assert_eq!(report.status, SyncStatus::Error);
        assert_eq!(report.created, 1);
        let stored = h.service.get_account(account.id).await.unwrap();
        assert!(stored.cursor.is_empty());
        assert_eq!(stored.sync_status, SyncStatus::Error);
        assert!(stored.sync_error.unwrap().contains("t2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_sync_surfaces_errors() {
        let h = harness(Err(ApiError::Auth));
        let account = mapped_account(&h).await;
        let ctx = SyncContext::manual(Uuid::nil());

        let result = h.service.sync_account(&ctx, account.id, None).await;

        assert!(matches!(result, Err(SyncError::PermanentAuth)));
        let stored = h.service.get_account(account.id).await.unwrap();
        assert_eq!(stored.sync_status, SyncStatus::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_sync_records_errors() {
        let h = harness(Err(ApiError::Server(500)));
        let account = mapped_account(&h).await;
        let ctx = SyncContext::scheduled(Uuid::nil());

        let report = h.service.sync_all(&ctx).await.unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.accounts[0].account_id, account.id);
        assert!(report.accounts[0].error.is_some());
    }

    #[tokio::test]
    async fn test_unmapped_account_rejected() {
        let h = harness(Ok(json!([])));
        let account = mapped_account(&h).await;
        h.service
            .update_mapping(
                account.id,
                MappingUpdate {
                    active: Some(false),
                    ..MappingUpdate::default()
                },
            )
            .await
            .unwrap();

        let result = h
            .service
            .sync_account(&SyncContext::manual(Uuid::nil()), account.id, None)
            .await;

        assert!(matches!(
            result,
            Err(SyncError::Domain(DomainError::AccountInactive(_)))
        ));
        assert_eq!(h.transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_mapping_currency_invariant() {
        let h = harness(Ok(json!([])));
        let account = mapped_account(&h).await;
        let ves = Journal {
            id: Uuid::new_v4(),
            company_id: Uuid::nil(),
            name: "Bank VES".to_string(),
            currency: "VES".to_string(),
        };
        h.store.add_journal(ves.clone());

        let result = h
            .service
            .update_mapping(
                account.id,
                MappingUpdate {
                    journal_id: Some(ves.id),
                    ..MappingUpdate::default()
                },
            )
            .await;

        assert!(matches!(
            result,
            Err(SyncError::Domain(DomainError::CurrencyMismatch { .. }))
        ));
        let stored = h.service.get_account(account.id).await.unwrap();
        assert_eq!(stored.journal_id, Some(h.journal.id));
    }

    #[tokio::test]
    async fn test_overlong_statement_prefix_rejected() {
        let h = harness(Ok(json!([])));
        let account = mapped_account(&h).await;

        let result = h
            .service
            .update_mapping(
                account.id,
                MappingUpdate {
                    statement_prefix: Some("X".repeat(MAX_STATEMENT_PREFIX_LEN + 1)),
                    ..MappingUpdate::default()
                },
            )
            .await;
        assert!(matches!(result, Err(SyncError::Validation(_))));
        let stored = h.service.get_account(account.id).await.unwrap();
        assert_eq!(stored.statement_prefix, "TESOTE/");

        let updated = h
            .service
            .update_mapping(
                account.id,
                MappingUpdate {
                    statement_prefix: Some("Ñ".repeat(MAX_STATEMENT_PREFIX_LEN)),
                    ..MappingUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.statement_prefix.chars().count(), MAX_STATEMENT_PREFIX_LEN);
    }

    #[tokio::test]
    async fn test_refresh_balance() {
        let h = harness(Ok(json!({"balance_cents": 12_345})));
        let account = mapped_account(&h).await;

        let balance = h
            .service
            .refresh_balance(&SyncContext::manual(Uuid::nil()), account.id)
            .await
            .unwrap();

        assert_eq!(balance, MinorUnits::new(12_345));
        let stored = h.service.get_account(account.id).await.unwrap();
        assert_eq!(stored.remote.balance, MinorUnits::new(12_345));
    }

    #[tokio::test]
    async fn test_register_and_delete_webhook() {
        let h = harness(Ok(Value::Null));
        h.transport.push(Ok(json!({"id": "wh_9"})));
        let ctx = SyncContext::manual(Uuid::nil());

        let endpoint = h
            .service
            .register_webhook(&ctx, "https://erp.example.com/", WebhookSubscriptions::default())
            .await
            .unwrap();

        assert_eq!(endpoint.remote_id.as_deref(), Some("wh_9"));
        let sent = h.transport.requests();
        let body = sent[0].body.clone().unwrap();
        assert_eq!(
            body["url"],
            format!("https://erp.example.com/tesote/webhook/{}", endpoint.id)
        );
        assert_eq!(body["secret"], endpoint.secret.as_str());

        h.service.delete_webhook(&ctx, endpoint.id).await.unwrap();

        assert_eq!(h.transport.requests()[1].path, "/webhooks/wh_9");
        let stored = WebhookRepository::get(h.store.as_ref(), endpoint.id)
            .await
            .unwrap()
            .unwrap();
        assert!(!stored.active);
        assert!(stored.remote_id.is_none());
    }

    #[tokio::test]
    async fn test_missing_token_is_not_configured() {
        let store = Arc::new(InMemoryStore::new());
        let service = SyncService::new(None, Repositories::from_store(store), SyncSettings::default());

        let result = service.test_connection(&SyncContext::manual(Uuid::nil())).await;

        assert!(matches!(result, Err(SyncError::NotConfigured(_))));
    }

    #[test]
    fn test_settings_from_config() {
        let config = TesoteConfig {
            sync_days: 14,
            max_transactions: 3000,
            company_id: Uuid::from_u128(7),
            ..TesoteConfig::default()
        };

        let settings = SyncSettings::from(&config);
        assert_eq!(settings.sync_days, 14);
        assert_eq!(settings.fetch.max_transactions, MAX_TRANSACTIONS_PER_SYNC);
        assert_eq!(settings.fetch.max_range_days, 30);
        assert_eq!(settings.company_id, Uuid::from_u128(7));
    }
}

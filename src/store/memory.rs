//! In-memory store
//!
//! Implements every repository contract behind a single mutex. Used by the
//! test suites and for running the service without a database.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::audit::{ApiCallLog, ApiLogSink};
use crate::domain::{
    Journal, MappedAccount, MinorUnits, NewStatement, NewStatementLine, PartnerRef,
    RemoteAccount, Statement, StatementLine, WebhookEndpoint,
};

use super::{
    AccountMapping, AccountRepository, JournalRepository, LineInsert, PartnerDirectory,
    StatementRepository, StoreError, SyncStateUpdate, WebhookRepository,
};

#[derive(Debug, Default)]
struct State {
    accounts: HashMap<Uuid, MappedAccount>,
    journals: HashMap<Uuid, Journal>,
    /// (company, document) -> partner
    partners: HashMap<(Uuid, String), PartnerRef>,
    statements: Vec<Statement>,
    lines: Vec<StatementLine>,
    webhooks: HashMap<Uuid, WebhookEndpoint>,
    api_logs: Vec<ApiCallLog>,
    failing_line_refs: HashSet<String>,
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_journal(&self, journal: Journal) {
        self.state().journals.insert(journal.id, journal);
    }

    /// Register a partner reachable by tax id or reference `document`
    pub fn add_partner(&self, company_id: Uuid, document: &str, partner: PartnerRef) {
        self.state()
            .partners
            .insert((company_id, document.to_string()), partner);
    }

    /// Make line creation fail for a given external reference
    pub fn fail_lines_for(&self, external_ref: &str) {
        self.state()
            .failing_line_refs
            .insert(external_ref.to_string());
    }

    pub fn all_statements(&self) -> Vec<Statement> {
        self.state().statements.clone()
    }

    pub fn all_lines(&self) -> Vec<StatementLine> {
        self.state().lines.clone()
    }

    pub fn api_logs(&self) -> Vec<ApiCallLog> {
        self.state().api_logs.clone()
    }
}

fn not_found(kind: &str, id: Uuid) -> StoreError {
    StoreError::NotFound(format!("{} {}", kind, id))
}

#[async_trait]
impl AccountRepository for InMemoryStore {
    async fn get(&self, id: Uuid) -> Result<Option<MappedAccount>, StoreError> {
        Ok(self.state().accounts.get(&id).cloned())
    }

    async fn find_by_external_id(
        &self,
        company_id: Uuid,
        external_id: &str,
    ) -> Result<Option<MappedAccount>, StoreError> {
        Ok(self
            .state()
            .accounts
            .values()
            .find(|a| a.company_id == company_id && a.remote.external_id == external_id)
            .cloned())
    }

    async fn list(&self, company_id: Uuid) -> Result<Vec<MappedAccount>, StoreError> {
        let mut accounts: Vec<MappedAccount> = self
            .state()
            .accounts
            .values()
            .filter(|a| a.company_id == company_id)
            .cloned()
            .collect();
        accounts.sort_by(|a, b| {
            (&a.remote.bank_name, &a.remote.masked_account)
                .cmp(&(&b.remote.bank_name, &b.remote.masked_account))
        });
        Ok(accounts)
    }

    async fn list_syncable(&self, company_id: Uuid) -> Result<Vec<MappedAccount>, StoreError> {
        let accounts = self.list(company_id).await?;
        Ok(accounts.into_iter().filter(|a| a.is_syncable()).collect())
    }

    async fn create(&self, account: &MappedAccount) -> Result<(), StoreError> {
        self.state().accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn update_snapshot(&self, id: Uuid, remote: &RemoteAccount) -> Result<(), StoreError> {
        let mut state = self.state();
        let account = state
            .accounts
            .get_mut(&id)
            .ok_or_else(|| not_found("account", id))?;
        account.refresh_snapshot(remote.clone());
        Ok(())
    }

    async fn update_mapping(&self, id: Uuid, mapping: &AccountMapping) -> Result<(), StoreError> {
        let mut state = self.state();
        let account = state
            .accounts
            .get_mut(&id)
            .ok_or_else(|| not_found("account", id))?;
        account.journal_id = mapping.journal_id;
        account.statement_prefix = mapping.statement_prefix.clone();
        account.active = mapping.active;
        account.updated_at = Utc::now();
        Ok(())
    }

    async fn update_sync_state(
        &self,
        id: Uuid,
        update: &SyncStateUpdate,
    ) -> Result<(), StoreError> {
        let mut state = self.state();
        let account = state
            .accounts
            .get_mut(&id)
            .ok_or_else(|| not_found("account", id))?;
        account.sync_status = update.status;
        account.sync_error = update.error.clone();
        if let Some(cursor) = &update.cursor {
            account.cursor = cursor.clone();
        }
        if let Some(at) = update.last_sync_at {
            account.last_sync_at = Some(at);
        }
        account.updated_at = Utc::now();
        Ok(())
    }

    async fn update_balance(&self, id: Uuid, balance: MinorUnits) -> Result<(), StoreError> {
        let mut state = self.state();
        let account = state
            .accounts
            .get_mut(&id)
            .ok_or_else(|| not_found("account", id))?;
        account.remote.balance = balance;
        account.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl JournalRepository for InMemoryStore {
    async fn get(&self, id: Uuid) -> Result<Option<Journal>, StoreError> {
        Ok(self.state().journals.get(&id).cloned())
    }
}

#[async_trait]
impl StatementRepository for InMemoryStore {
    async fn find_statement(
        &self,
        journal_id: Uuid,
        name: &str,
        date: NaiveDate,
    ) -> Result<Option<Statement>, StoreError> {
        Ok(self
            .state()
            .statements
            .iter()
            .find(|s| s.journal_id == journal_id && s.name == name && s.date == date)
            .cloned())
    }

    async fn create_statement(&self, statement: &NewStatement) -> Result<Statement, StoreError> {
        let created = Statement {
            id: Uuid::new_v4(),
            journal_id: statement.journal_id,
            account_id: statement.account_id,
            name: statement.name.clone(),
            date: statement.date,
            created_at: Utc::now(),
        };
        self.state().statements.push(created.clone());
        Ok(created)
    }

    async fn find_line(
        &self,
        statement_id: Uuid,
        external_ref: &str,
    ) -> Result<Option<StatementLine>, StoreError> {
        Ok(self
            .state()
            .lines
            .iter()
            .find(|l| l.statement_id == statement_id && l.external_ref == external_ref)
            .cloned())
    }

    async fn create_line(&self, line: &NewStatementLine) -> Result<LineInsert, StoreError> {
        let mut state = self.state();
        if state.failing_line_refs.contains(&line.external_ref) {
            return Err(StoreError::Backend(format!(
                "line insert rejected for {}",
                line.external_ref
            )));
        }
        let exists = state
            .lines
            .iter()
            .any(|l| l.statement_id == line.statement_id && l.external_ref == line.external_ref);
        if exists {
            return Ok(LineInsert::Duplicate);
        }

        let created = StatementLine {
            id: Uuid::new_v4(),
            statement_id: line.statement_id,
            external_ref: line.external_ref.clone(),
            date: line.date,
            amount: line.amount,
            payment_ref: line.payment_ref.clone(),
            partner_name: line.partner_name.clone(),
            partner_id: line.partner_id,
            created_at: Utc::now(),
        };
        state.lines.push(created.clone());
        Ok(LineInsert::Created(created))
    }

    async fn lines(&self, statement_id: Uuid) -> Result<Vec<StatementLine>, StoreError> {
        Ok(self
            .state()
            .lines
            .iter()
            .filter(|l| l.statement_id == statement_id)
            .cloned()
            .collect())
    }

    async fn statements_for_account(
        &self,
        account_id: Uuid,
    ) -> Result<Vec<Statement>, StoreError> {
        let mut statements: Vec<Statement> = self
            .state()
            .statements
            .iter()
            .filter(|s| s.account_id == account_id)
            .cloned()
            .collect();
        statements.sort_by_key(|s| s.date);
        Ok(statements)
    }
}

#[async_trait]
impl PartnerDirectory for InMemoryStore {
    async fn find_by_document(
        &self,
        company_id: Uuid,
        document: &str,
    ) -> Result<Option<PartnerRef>, StoreError> {
        Ok(self
            .state()
            .partners
            .get(&(company_id, document.to_string()))
            .cloned())
    }
}

#[async_trait]
impl WebhookRepository for InMemoryStore {
    async fn get(&self, id: Uuid) -> Result<Option<WebhookEndpoint>, StoreError> {
        Ok(self.state().webhooks.get(&id).cloned())
    }

    async fn create(&self, endpoint: &WebhookEndpoint) -> Result<(), StoreError> {
        self.state().webhooks.insert(endpoint.id, endpoint.clone());
        Ok(())
    }

    async fn record_event(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut state = self.state();
        let endpoint = state
            .webhooks
            .get_mut(&id)
            .ok_or_else(|| not_found("webhook", id))?;
        endpoint.events_received += 1;
        endpoint.last_received_at = Some(at);
        Ok(())
    }

    async fn set_remote_id(&self, id: Uuid, remote_id: Option<&str>) -> Result<(), StoreError> {
        let mut state = self.state();
        let endpoint = state
            .webhooks
            .get_mut(&id)
            .ok_or_else(|| not_found("webhook", id))?;
        endpoint.remote_id = remote_id.map(str::to_string);
        Ok(())
    }

    async fn set_active(&self, id: Uuid, active: bool) -> Result<(), StoreError> {
        let mut state = self.state();
        let endpoint = state
            .webhooks
            .get_mut(&id)
            .ok_or_else(|| not_found("webhook", id))?;
        endpoint.active = active;
        Ok(())
    }
}

#[async_trait]
impl ApiLogSink for InMemoryStore {
    async fn record(&self, entry: &ApiCallLog) -> Result<(), StoreError> {
        self.state().api_logs.push(entry.clone());
        Ok(())
    }
}

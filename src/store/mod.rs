//! Store module
//!
//! Narrow repository contracts for the records this crate reads and writes.
//! The engines only see these traits; `postgres` and `memory` provide the
//! implementations.

mod memory;
mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{
    Journal, MappedAccount, MinorUnits, NewStatement, NewStatementLine, PartnerRef,
    RemoteAccount, Statement, StatementLine, SyncCursor, SyncStatus, WebhookEndpoint,
};

pub use memory::InMemoryStore;
pub use postgres::PgStore;

/// Store Error
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Operator-editable part of a mapped account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountMapping {
    pub journal_id: Option<Uuid>,
    pub statement_prefix: String,
    pub active: bool,
}

/// Field update for the sync-state columns of a mapped account.
///
/// `cursor` is only written when `Some`, so a failed or partial sync
/// leaves the previous cursor in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStateUpdate {
    pub status: SyncStatus,
    pub error: Option<String>,
    pub cursor: Option<SyncCursor>,
    pub last_sync_at: Option<DateTime<Utc>>,
}

impl SyncStateUpdate {
    pub fn syncing() -> Self {
        Self {
            status: SyncStatus::Syncing,
            error: None,
            cursor: None,
            last_sync_at: None,
        }
    }

    pub fn succeeded(cursor: Option<SyncCursor>, at: DateTime<Utc>) -> Self {
        Self {
            status: SyncStatus::Success,
            error: None,
            cursor,
            last_sync_at: Some(at),
        }
    }

    pub fn failed(error: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            status: SyncStatus::Error,
            error: Some(error.into()),
            cursor: None,
            last_sync_at: Some(at),
        }
    }
}

/// Outcome of an idempotent line insert
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineInsert {
    Created(StatementLine),
    /// A line with the same (statement, external ref) already exists
    Duplicate,
}

#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<MappedAccount>, StoreError>;

    async fn find_by_external_id(
        &self,
        company_id: Uuid,
        external_id: &str,
    ) -> Result<Option<MappedAccount>, StoreError>;

    async fn list(&self, company_id: Uuid) -> Result<Vec<MappedAccount>, StoreError>;

    /// Active accounts with a journal
    async fn list_syncable(&self, company_id: Uuid) -> Result<Vec<MappedAccount>, StoreError>;

    async fn create(&self, account: &MappedAccount) -> Result<(), StoreError>;

    /// Replace the remote snapshot without touching mapping or cursor
    async fn update_snapshot(&self, id: Uuid, remote: &RemoteAccount) -> Result<(), StoreError>;

    async fn update_mapping(&self, id: Uuid, mapping: &AccountMapping) -> Result<(), StoreError>;

    async fn update_sync_state(&self, id: Uuid, update: &SyncStateUpdate)
        -> Result<(), StoreError>;

    async fn update_balance(&self, id: Uuid, balance: MinorUnits) -> Result<(), StoreError>;
}

#[async_trait]
pub trait JournalRepository: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<Journal>, StoreError>;
}

#[async_trait]
pub trait StatementRepository: Send + Sync {
    async fn find_statement(
        &self,
        journal_id: Uuid,
        name: &str,
        date: NaiveDate,
    ) -> Result<Option<Statement>, StoreError>;

    async fn create_statement(&self, statement: &NewStatement) -> Result<Statement, StoreError>;

    async fn find_line(
        &self,
        statement_id: Uuid,
        external_ref: &str,
    ) -> Result<Option<StatementLine>, StoreError>;

    /// Insert a line unless one with the same (statement, external ref) exists
    async fn create_line(&self, line: &NewStatementLine) -> Result<LineInsert, StoreError>;

    async fn lines(&self, statement_id: Uuid) -> Result<Vec<StatementLine>, StoreError>;

    async fn statements_for_account(&self, account_id: Uuid)
        -> Result<Vec<Statement>, StoreError>;
}

/// Best-effort counterpart lookup
#[async_trait]
pub trait PartnerDirectory: Send + Sync {
    /// Match on tax id or partner reference
    async fn find_by_document(
        &self,
        company_id: Uuid,
        document: &str,
    ) -> Result<Option<PartnerRef>, StoreError>;
}

#[async_trait]
pub trait WebhookRepository: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<WebhookEndpoint>, StoreError>;

    async fn create(&self, endpoint: &WebhookEndpoint) -> Result<(), StoreError>;

    /// Increment the received counter and stamp the last-received time
    async fn record_event(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError>;

    async fn set_remote_id(&self, id: Uuid, remote_id: Option<&str>) -> Result<(), StoreError>;

    async fn set_active(&self, id: Uuid, active: bool) -> Result<(), StoreError>;
}

/// Repository handles shared by the services
#[derive(Clone)]
pub struct Repositories {
    pub accounts: Arc<dyn AccountRepository>,
    pub journals: Arc<dyn JournalRepository>,
    pub statements: Arc<dyn StatementRepository>,
    pub partners: Arc<dyn PartnerDirectory>,
    pub webhooks: Arc<dyn WebhookRepository>,
}

impl Repositories {
    /// Use one store for every contract
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: AccountRepository
            + JournalRepository
            + StatementRepository
            + PartnerDirectory
            + WebhookRepository
            + 'static,
    {
        Self {
            accounts: store.clone(),
            journals: store.clone(),
            statements: store.clone(),
            partners: store.clone(),
            webhooks: store,
        }
    }
}

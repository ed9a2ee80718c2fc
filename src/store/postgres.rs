//! PostgreSQL store
//!
//! Runtime-checked queries against the tables created by
//! `migrations/0001_tesote.sql`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::domain::{
    Journal, MappedAccount, MinorUnits, NewStatement, NewStatementLine, PartnerRef,
    RemoteAccount, Statement, StatementLine, SyncCursor, SyncStatus, WebhookEndpoint,
    WebhookSubscriptions,
};

use super::{
    AccountMapping, AccountRepository, JournalRepository, LineInsert, PartnerDirectory,
    StatementRepository, StoreError, SyncStateUpdate, WebhookRepository,
};

const ACCOUNT_COLUMNS: &str = r#"
    id, company_id, external_id, name, bank_name, masked_account, currency,
    legal_entity_id, legal_entity_name, balance_cents,
    journal_id, statement_prefix, active,
    last_transaction_id, last_transaction_date, last_sync_at, sync_status, sync_error,
    created_at, updated_at
"#;

const LINE_COLUMNS: &str = r#"
    id, statement_id, external_ref, date, amount, payment_ref, partner_name, partner_id, created_at
"#;

/// Repository set backed by a PostgreSQL pool
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn account_from_row(row: &PgRow) -> Result<MappedAccount, sqlx::Error> {
    let status: String = row.try_get("sync_status")?;
    Ok(MappedAccount {
        id: row.try_get("id")?,
        company_id: row.try_get("company_id")?,
        remote: RemoteAccount {
            external_id: row.try_get("external_id")?,
            name: row.try_get("name")?,
            bank_name: row.try_get("bank_name")?,
            masked_account: row.try_get("masked_account")?,
            currency: row.try_get("currency")?,
            legal_entity_id: row.try_get("legal_entity_id")?,
            legal_entity_name: row.try_get("legal_entity_name")?,
            balance: MinorUnits::new(row.try_get("balance_cents")?),
        },
        journal_id: row.try_get("journal_id")?,
        statement_prefix: row.try_get("statement_prefix")?,
        active: row.try_get("active")?,
        cursor: SyncCursor {
            last_transaction_id: row.try_get("last_transaction_id")?,
            last_transaction_date: row.try_get("last_transaction_date")?,
        },
        last_sync_at: row.try_get("last_sync_at")?,
        sync_status: SyncStatus::from(status),
        sync_error: row.try_get("sync_error")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn line_from_row(row: &PgRow) -> Result<StatementLine, sqlx::Error> {
    Ok(StatementLine {
        id: row.try_get("id")?,
        statement_id: row.try_get("statement_id")?,
        external_ref: row.try_get("external_ref")?,
        date: row.try_get("date")?,
        amount: row.try_get::<Decimal, _>("amount")?,
        payment_ref: row.try_get("payment_ref")?,
        partner_name: row.try_get("partner_name")?,
        partner_id: row.try_get("partner_id")?,
        created_at: row.try_get("created_at")?,
    })
}

fn webhook_from_row(row: &PgRow) -> Result<WebhookEndpoint, sqlx::Error> {
    Ok(WebhookEndpoint {
        id: row.try_get("id")?,
        active: row.try_get("active")?,
        secret: row.try_get("secret")?,
        remote_id: row.try_get("remote_id")?,
        subscriptions: WebhookSubscriptions {
            account_updates: row.try_get("subscribe_account_update")?,
            new_transactions: row.try_get("subscribe_transaction_new")?,
            balance_updates: row.try_get("subscribe_balance_update")?,
        },
        events_received: row.try_get("events_received")?,
        last_received_at: row.try_get("last_received_at")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Fail with `NotFound` when an UPDATE touched nothing
fn ensure_updated(rows: u64, kind: &str, id: Uuid) -> Result<(), StoreError> {
    if rows == 0 {
        return Err(StoreError::NotFound(format!("{} {}", kind, id)));
    }
    Ok(())
}

// =========================================================================
// Accounts
// =========================================================================

#[async_trait]
impl AccountRepository for PgStore {
    async fn get(&self, id: Uuid) -> Result<Option<MappedAccount>, StoreError> {
        let sql = format!("SELECT {} FROM tesote_accounts WHERE id = $1", ACCOUNT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(account_from_row).transpose()?)
    }

    async fn find_by_external_id(
        &self,
        company_id: Uuid,
        external_id: &str,
    ) -> Result<Option<MappedAccount>, StoreError> {
        let sql = format!(
            "SELECT {} FROM tesote_accounts WHERE company_id = $1 AND external_id = $2",
            ACCOUNT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(company_id)
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(account_from_row).transpose()?)
    }

    async fn list(&self, company_id: Uuid) -> Result<Vec<MappedAccount>, StoreError> {
        let sql = format!(
            "SELECT {} FROM tesote_accounts WHERE company_id = $1 ORDER BY bank_name, masked_account",
            ACCOUNT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(company_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(account_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn list_syncable(&self, company_id: Uuid) -> Result<Vec<MappedAccount>, StoreError> {
        let sql = format!(
            r#"
            SELECT {} FROM tesote_accounts
            WHERE company_id = $1 AND active = true AND journal_id IS NOT NULL
            ORDER BY bank_name, masked_account
            "#,
            ACCOUNT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(company_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(account_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn create(&self, account: &MappedAccount) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO tesote_accounts (
                id, company_id, external_id, name, bank_name, masked_account, currency,
                legal_entity_id, legal_entity_name, balance_cents,
                journal_id, statement_prefix, active, sync_status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(account.id)
        .bind(account.company_id)
        .bind(&account.remote.external_id)
        .bind(&account.remote.name)
        .bind(&account.remote.bank_name)
        .bind(&account.remote.masked_account)
        .bind(&account.remote.currency)
        .bind(&account.remote.legal_entity_id)
        .bind(&account.remote.legal_entity_name)
        .bind(account.remote.balance.value())
        .bind(account.journal_id)
        .bind(&account.statement_prefix)
        .bind(account.active)
        .bind(account.sync_status.to_string())
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_snapshot(&self, id: Uuid, remote: &RemoteAccount) -> Result<(), StoreError> {
        let rows = sqlx::query(
            r#"
            UPDATE tesote_accounts
            SET name = $2, bank_name = $3, masked_account = $4, currency = $5,
                legal_entity_id = $6, legal_entity_name = $7, balance_cents = $8,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&remote.name)
        .bind(&remote.bank_name)
        .bind(&remote.masked_account)
        .bind(&remote.currency)
        .bind(&remote.legal_entity_id)
        .bind(&remote.legal_entity_name)
        .bind(remote.balance.value())
        .execute(&self.pool)
        .await?
        .rows_affected();

        ensure_updated(rows, "account", id)
    }

    async fn update_mapping(&self, id: Uuid, mapping: &AccountMapping) -> Result<(), StoreError> {
        let rows = sqlx::query(
            r#"
            UPDATE tesote_accounts
            SET journal_id = $2, statement_prefix = $3, active = $4, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(mapping.journal_id)
        .bind(&mapping.statement_prefix)
        .bind(mapping.active)
        .execute(&self.pool)
        .await?
        .rows_affected();

        ensure_updated(rows, "account", id)
    }

    async fn update_sync_state(
        &self,
        id: Uuid,
        update: &SyncStateUpdate,
    ) -> Result<(), StoreError> {
        let (advance_cursor, last_id, last_date) = match &update.cursor {
            Some(cursor) => (
                true,
                cursor.last_transaction_id.clone(),
                cursor.last_transaction_date,
            ),
            None => (false, None, None),
        };

        let rows = sqlx::query(
            r#"
            UPDATE tesote_accounts
            SET sync_status = $2,
                sync_error = $3,
                last_transaction_id = CASE WHEN $4 THEN $5 ELSE last_transaction_id END,
                last_transaction_date = CASE WHEN $4 THEN $6 ELSE last_transaction_date END,
                last_sync_at = COALESCE($7, last_sync_at),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(update.status.to_string())
        .bind(&update.error)
        .bind(advance_cursor)
        .bind(last_id)
        .bind(last_date)
        .bind(update.last_sync_at)
        .execute(&self.pool)
        .await?
        .rows_affected();

        ensure_updated(rows, "account", id)
    }

    async fn update_balance(&self, id: Uuid, balance: MinorUnits) -> Result<(), StoreError> {
        let rows = sqlx::query(
            "UPDATE tesote_accounts SET balance_cents = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(balance.value())
        .execute(&self.pool)
        .await?
        .rows_affected();

        ensure_updated(rows, "account", id)
    }
}

// =========================================================================
// Journals and partners
// =========================================================================

#[async_trait]
impl JournalRepository for PgStore {
    async fn get(&self, id: Uuid) -> Result<Option<Journal>, StoreError> {
        let row: Option<(Uuid, Uuid, String, String)> = sqlx::query_as(
            "SELECT id, company_id, name, currency FROM journals WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id, company_id, name, currency)| Journal {
            id,
            company_id,
            name,
            currency,
        }))
    }
}

#[async_trait]
impl PartnerDirectory for PgStore {
    async fn find_by_document(
        &self,
        company_id: Uuid,
        document: &str,
    ) -> Result<Option<PartnerRef>, StoreError> {
        let row: Option<(Uuid, String)> = sqlx::query_as(
            r#"
            SELECT id, name FROM partners
            WHERE company_id = $1 AND (vat = $2 OR ref = $2)
            ORDER BY id
            LIMIT 1
            "#,
        )
        .bind(company_id)
        .bind(document)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id, name)| PartnerRef { id, name }))
    }
}

// =========================================================================
// Statements
// =========================================================================

#[async_trait]
impl StatementRepository for PgStore {
    async fn find_statement(
        &self,
        journal_id: Uuid,
        name: &str,
        date: NaiveDate,
    ) -> Result<Option<Statement>, StoreError> {
        let row: Option<(Uuid, Uuid, Uuid, String, NaiveDate, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT id, journal_id, account_id, name, date, created_at
            FROM bank_statements
            WHERE journal_id = $1 AND name = $2 AND date = $3
            LIMIT 1
            "#,
        )
        .bind(journal_id)
        .bind(name)
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(
            |(id, journal_id, account_id, name, date, created_at)| Statement {
                id,
                journal_id,
                account_id,
                name,
                date,
                created_at,
            },
        ))
    }

    async fn create_statement(&self, statement: &NewStatement) -> Result<Statement, StoreError> {
        // Concurrent invocations may race on the same bucket; the unique
        // (journal_id, name, date) index makes the second insert a no-op.
        let inserted: Option<(Uuid, DateTime<Utc>)> = sqlx::query_as(
            r#"
            INSERT INTO bank_statements (id, journal_id, account_id, name, date)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (journal_id, name, date) DO NOTHING
            RETURNING id, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(statement.journal_id)
        .bind(statement.account_id)
        .bind(&statement.name)
        .bind(statement.date)
        .fetch_optional(&self.pool)
        .await?;

        match inserted {
            Some((id, created_at)) => Ok(Statement {
                id,
                journal_id: statement.journal_id,
                account_id: statement.account_id,
                name: statement.name.clone(),
                date: statement.date,
                created_at,
            }),
            None => self
                .find_statement(statement.journal_id, &statement.name, statement.date)
                .await?
                .ok_or_else(|| StoreError::NotFound(format!("statement {}", statement.name))),
        }
    }

    async fn find_line(
        &self,
        statement_id: Uuid,
        external_ref: &str,
    ) -> Result<Option<StatementLine>, StoreError> {
        let sql = format!(
            "SELECT {} FROM bank_statement_lines WHERE statement_id = $1 AND external_ref = $2",
            LINE_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(statement_id)
            .bind(external_ref)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(line_from_row).transpose()?)
    }

    async fn create_line(&self, line: &NewStatementLine) -> Result<LineInsert, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO bank_statement_lines (
                id, statement_id, external_ref, date, amount, payment_ref, partner_name, partner_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (statement_id, external_ref) DO NOTHING
            RETURNING {}
            "#,
            LINE_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(Uuid::new_v4())
            .bind(line.statement_id)
            .bind(&line.external_ref)
            .bind(line.date)
            .bind(line.amount)
            .bind(&line.payment_ref)
            .bind(&line.partner_name)
            .bind(line.partner_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(LineInsert::Created(line_from_row(&row)?)),
            None => Ok(LineInsert::Duplicate),
        }
    }

    async fn lines(&self, statement_id: Uuid) -> Result<Vec<StatementLine>, StoreError> {
        let sql = format!(
            "SELECT {} FROM bank_statement_lines WHERE statement_id = $1 ORDER BY created_at",
            LINE_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(statement_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(line_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn statements_for_account(
        &self,
        account_id: Uuid,
    ) -> Result<Vec<Statement>, StoreError> {
        let rows: Vec<(Uuid, Uuid, Uuid, String, NaiveDate, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT id, journal_id, account_id, name, date, created_at
            FROM bank_statements
            WHERE account_id = $1
            ORDER BY date
            "#,
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(id, journal_id, account_id, name, date, created_at)| Statement {
                    id,
                    journal_id,
                    account_id,
                    name,
                    date,
                    created_at,
                },
            )
            .collect())
    }
}

// =========================================================================
// Webhooks
// =========================================================================

#[async_trait]
impl WebhookRepository for PgStore {
    async fn get(&self, id: Uuid) -> Result<Option<WebhookEndpoint>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, active, secret, remote_id,
                   subscribe_account_update, subscribe_transaction_new, subscribe_balance_update,
                   events_received, last_received_at, created_at
            FROM tesote_webhooks
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(webhook_from_row).transpose()?)
    }

    async fn create(&self, endpoint: &WebhookEndpoint) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO tesote_webhooks (
                id, active, secret, remote_id,
                subscribe_account_update, subscribe_transaction_new, subscribe_balance_update,
                events_received, last_received_at, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(endpoint.id)
        .bind(endpoint.active)
        .bind(&endpoint.secret)
        .bind(&endpoint.remote_id)
        .bind(endpoint.subscriptions.account_updates)
        .bind(endpoint.subscriptions.new_transactions)
        .bind(endpoint.subscriptions.balance_updates)
        .bind(endpoint.events_received)
        .bind(endpoint.last_received_at)
        .bind(endpoint.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_event(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        let rows = sqlx::query(
            r#"
            UPDATE tesote_webhooks
            SET events_received = events_received + 1, last_received_at = $2
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await?
        .rows_affected();

        ensure_updated(rows, "webhook", id)
    }

    async fn set_remote_id(&self, id: Uuid, remote_id: Option<&str>) -> Result<(), StoreError> {
        let rows = sqlx::query("UPDATE tesote_webhooks SET remote_id = $2 WHERE id = $1")
            .bind(id)
            .bind(remote_id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        ensure_updated(rows, "webhook", id)
    }

    async fn set_active(&self, id: Uuid, active: bool) -> Result<(), StoreError> {
        let rows = sqlx::query("UPDATE tesote_webhooks SET active = $2 WHERE id = $1")
            .bind(id)
            .bind(active)
            .execute(&self.pool)
            .await?
            .rows_affected();

        ensure_updated(rows, "webhook", id)
    }
}

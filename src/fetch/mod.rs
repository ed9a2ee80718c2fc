//! Pagination/Fetch Engine
//!
//! Page-number retrieval for accounts and after-id retrieval for
//! transactions, all through a `RateGovernor` so the session limits apply.

mod parse;

use chrono::{Duration as ChronoDuration, NaiveDate};

use crate::client::{ApiRequest, TransactionPage};
use crate::domain::{MappedAccount, RemoteAccount, RemoteTransaction, SyncContext, SyncCursor};
use crate::governor::RateGovernor;
use crate::sync::SyncError;

pub use parse::{parse_account, parse_balance, parse_page, parse_transaction, Page};

/// Hard ceiling on transactions kept by one sync, whatever the policy asks for
pub const MAX_TRANSACTIONS_PER_SYNC: usize = 100;

/// Volume and range limits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPolicy {
    pub account_page_size: u32,
    pub transaction_page_size: u32,
    /// Transactions kept per sync
    pub max_transactions: usize,
    /// Longest date window of a sync without cursor
    pub max_range_days: i64,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            account_page_size: 50,
            transaction_page_size: 100,
            max_transactions: 100,
            max_range_days: 30,
        }
    }
}

/// Where a transactions fetch starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionWindow {
    /// Everything after the committed cursor
    AfterId(String),
    /// Inclusive date range
    Range { start: NaiveDate, end: NaiveDate },
}

impl FetchPolicy {
    /// Cursor when the account has one, else the last `days` days up to today.
    pub fn plan_window(&self, cursor: &SyncCursor, days: i64, today: NaiveDate) -> TransactionWindow {
        if let Some(after_id) = &cursor.last_transaction_id {
            return TransactionWindow::AfterId(after_id.clone());
        }

        let mut days = days.max(1);
        if days > self.max_range_days {
            tracing::warn!(
                requested_days = days,
                max_days = self.max_range_days,
                "Sync range clipped"
            );
            days = self.max_range_days;
        }

        TransactionWindow::Range {
            start: today - ChronoDuration::days(days),
            end: today,
        }
    }
}

/// Fetches records for one session
#[derive(Debug, Clone, Default)]
pub struct FetchEngine {
    policy: FetchPolicy,
}

impl FetchEngine {
    /// `max_transactions` is held to `1..=MAX_TRANSACTIONS_PER_SYNC`
    pub fn new(mut policy: FetchPolicy) -> Self {
        let requested = policy.max_transactions;
        policy.max_transactions = requested.clamp(1, MAX_TRANSACTIONS_PER_SYNC);
        if policy.max_transactions != requested {
            tracing::warn!(
                requested = requested,
                max = policy.max_transactions,
                "Transaction cap clamped"
            );
        }
        Self { policy }
    }

    pub fn policy(&self) -> &FetchPolicy {
        &self.policy
    }

    /// All remote accounts, page by page
    pub async fn accounts(
        &self,
        governor: &mut RateGovernor,
        ctx: &SyncContext,
    ) -> Result<Vec<RemoteAccount>, SyncError> {
        let per_page = self.policy.account_page_size;
        let mut accounts = Vec::new();
        let mut page_number = 1u32;

        loop {
            let body = governor
                .execute(&ApiRequest::list_accounts(page_number, per_page), ctx)
                .await?;
            let page = parse_page(&body).map_err(|e| SyncError::PermanentClient(e.to_string()))?;
            let received = page.records.len();

            for record in &page.records {
                match parse_account(record) {
                    Ok(account) => accounts.push(account),
                    Err(e) => {
                        tracing::warn!(error = %e, correlation_id = %ctx.correlation_id, "Skipping account record");
                    }
                }
            }

            let last_page = match page.total_pages {
                Some(total) => page_number >= total,
                None => false,
            };
            if last_page || received < per_page as usize {
                break;
            }
            page_number += 1;
        }

        tracing::info!(
            accounts = accounts.len(),
            pages = page_number,
            correlation_id = %ctx.correlation_id,
            "Fetched remote accounts"
        );
        Ok(accounts)
    }

    /// Transactions of `account` in `window`, capped at `max_transactions`.
    pub async fn transactions(
        &self,
        governor: &mut RateGovernor,
        ctx: &SyncContext,
        account: &MappedAccount,
        window: &TransactionWindow,
    ) -> Result<Vec<RemoteTransaction>, SyncError> {
        let cap = self.policy.max_transactions;
        let (range, mut after_id) = match window {
            TransactionWindow::AfterId(id) => (None, Some(id.clone())),
            TransactionWindow::Range { start, end } => (Some((*start, *end)), None),
        };

        let mut transactions: Vec<RemoteTransaction> = Vec::new();
        let mut page_number = 0u32;

        while transactions.len() < cap {
            page_number += 1;
            let per_page = self
                .policy
                .transaction_page_size
                .min((cap - transactions.len()) as u32);
            let request = ApiRequest::transactions(
                account.external_id(),
                &TransactionPage {
                    range,
                    after_id: after_id.clone(),
                    per_page,
                },
            )
            .for_account(account.id);

            let body = governor.execute(&request, ctx).await?;
            let page = parse_page(&body).map_err(|e| SyncError::PermanentClient(e.to_string()))?;
            let received = page.records.len();

            for record in &page.records {
                match parse_transaction(record, account.currency()) {
                    Ok(txn) => transactions.push(txn),
                    Err(e) => {
                        tracing::warn!(
                            account_id = %account.id,
                            error = %e,
                            correlation_id = %ctx.correlation_id,
                            "Skipping transaction record"
                        );
                    }
                }
            }

            if received == 0 || received < per_page as usize {
                break;
            }
            if let Some(total) = page.total_pages {
                if page_number >= total {
                    break;
                }
            }

            let highest = transactions.iter().map(|t| &t.external_id).max().cloned();
            if highest.is_none() || highest == after_id {
                // No progress possible
                break;
            }
            after_id = highest;
        }

        if transactions.len() > cap {
            tracing::warn!(
                account_id = %account.id,
                fetched = transactions.len(),
                cap = cap,
                "Transaction batch truncated"
            );
            transactions.truncate(cap);
        }

        tracing::info!(
            account_id = %account.id,
            transactions = transactions.len(),
            pages = page_number,
            correlation_id = %ctx.correlation_id,
            "Fetched transactions"
        );
        Ok(transactions)
    }
}

/// Greatest id and latest date of a batch, `None` for an empty batch
pub fn next_cursor(transactions: &[RemoteTransaction]) -> Option<SyncCursor> {
    let last_id = transactions.iter().map(|t| &t.external_id).max()?;
    let last_date = transactions.iter().map(|t| t.date).max()?;
    Some(SyncCursor::new(last_id.clone(), last_date))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::TracingLogSink;
    use crate::client::testing::ScriptedTransport;
    use crate::client::TesoteClient;
    use crate::domain::{MinorUnits, TransactionKind};
    use crate::governor::GovernorPolicy;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use uuid::Uuid;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn txn(id: &str, day: NaiveDate) -> RemoteTransaction {
        RemoteTransaction {
            external_id: id.to_string(),
            date: day,
            amount: MinorUnits::new(100),
            kind: TransactionKind::Credit,
            description: String::new(),
            reference: id.to_string(),
            counterpart_name: None,
            counterpart_document: None,
        }
    }

    fn account() -> MappedAccount {
        MappedAccount::discovered(
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
        )
    }

    fn governor(transport: Arc<ScriptedTransport>) -> RateGovernor {
        let client = Arc::new(TesoteClient::new(transport, Arc::new(TracingLogSink)));
        RateGovernor::new(client, GovernorPolicy::default())
    }

    fn records(ids: &[&str]) -> Value {
        let items: Vec<Value> = ids
            .iter()
            .map(|id| json!({"id": id, "date": "2024-01-01", "amount_cents": 100}))
            .collect();
        json!({ "data": items })
    }

    #[test]
    fn test_cursor_is_greatest_id() {
        let batch = vec![
            txn("t1", date(2024, 1, 1)),
            txn("t3", date(2024, 1, 2)),
            txn("t2", date(2024, 1, 3)),
        ];
        let cursor = next_cursor(&batch).unwrap();
        assert_eq!(cursor.last_transaction_id.as_deref(), Some("t3"));
        assert_eq!(cursor.last_transaction_date, Some(date(2024, 1, 3)));
        assert!(next_cursor(&[]).is_none());
    }

    #[test]
    fn test_long_first_sync_clipped() {
        let policy = FetchPolicy::default();
        let today = date(2024, 3, 31);
        let window = policy.plan_window(&SyncCursor::default(), 90, today);
        assert_eq!(
            window,
            TransactionWindow::Range {
                start: date(2024, 3, 1),
                end: today
            }
        );
    }

    #[test]
    fn test_cursor_takes_precedence() {
        let policy = FetchPolicy::default();
        let cursor = SyncCursor::new("t7", date(2024, 1, 1));
        assert_eq!(
            policy.plan_window(&cursor, 7, date(2024, 3, 31)),
            TransactionWindow::AfterId("t7".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_clipped_range_sent_upstream() {
        let transport = Arc::new(ScriptedTransport::new(Ok(json!([]))));
        let mut gov = governor(transport.clone());
        let engine = FetchEngine::default();
        let today = date(2024, 3, 31);
        let ctx = SyncContext::manual(Uuid::nil()).with_today(today);
        let window = engine.policy().plan_window(&SyncCursor::default(), 90, today);

        engine.transactions(&mut gov, &ctx, &account(), &window).await.unwrap();

        let sent = transport.requests();
        assert_eq!(sent[0].query_value("start_date"), Some("2024-03-01"));
        assert_eq!(sent[0].query_value("end_date"), Some("2024-03-31"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pages_advance_after_id() {
        let transport = Arc::new(ScriptedTransport::new(Ok(json!([]))));
        transport.push(Ok(records(&["t1", "t2"])));
        transport.push(Ok(records(&["t3"])));
        let mut gov = governor(transport.clone());
        let engine = FetchEngine::new(FetchPolicy {
            transaction_page_size: 2,
            ..FetchPolicy::default()
        });
        let ctx = SyncContext::scheduled(Uuid::nil());

        let batch = engine
            .transactions(&mut gov, &ctx, &account(), &TransactionWindow::AfterId("t0".into()))
            .await
            .unwrap();

        assert_eq!(batch.len(), 3);
        let sent = transport.requests();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].query_value("after_id"), Some("t0"));
        assert_eq!(sent[1].query_value("after_id"), Some("t2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transaction_cap() {
        let transport = Arc::new(ScriptedTransport::new(Ok(records(&["x1", "x2", "x3"]))));
        let mut gov = governor(transport.clone());
        let engine = FetchEngine::new(FetchPolicy {
            transaction_page_size: 3,
            max_transactions: 4,
            ..FetchPolicy::default()
        });
        let ctx = SyncContext::scheduled(Uuid::nil());

        let batch = engine
            .transactions(&mut gov, &ctx, &account(), &TransactionWindow::AfterId("x0".into()))
            .await
            .unwrap();

        // second page asks only for the remaining slot
        assert_eq!(transport.requests()[1].query_value("per_page"), Some("1"));
        assert_eq!(batch.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_records_dropped() {
        let transport = Arc::new(ScriptedTransport::new(Ok(json!([
            {"id": "t1", "date": "2024-01-01", "amount_cents": 100},
            {"date": "2024-01-01", "amount_cents": 100},
            {"id": "t3", "date": "garbage", "amount_cents": 100}
        ]))));
        let mut gov = governor(transport);
        let engine = FetchEngine::default();
        let ctx = SyncContext::manual(Uuid::nil());

        let batch = engine
            .transactions(&mut gov, &ctx, &account(), &TransactionWindow::AfterId("t0".into()))
            .await
            .unwrap();

        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].external_id, "t1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_account_pages_stop_at_total() {
        let transport = Arc::new(ScriptedTransport::new(Ok(json!([]))));
        let page = |id: &str| {
            let items: Vec<Value> = (0..50).map(|i| json!({"id": format!("{}{}", id, i)})).collect();
            json!({"data": items, "meta": {"total_pages": 2}})
        };
        transport.push(Ok(page("a")));
        transport.push(Ok(page("b")));
        let mut gov = governor(transport.clone());
        let ctx = SyncContext::manual(Uuid::nil());

        let accounts = FetchEngine::default().accounts(&mut gov, &ctx).await.unwrap();

        assert_eq!(accounts.len(), 100);
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cap_held_to_hard_maximum() {
        let ids: Vec<String> = (0..100).map(|i| format!("t{:03}", i)).collect();
        let ids: Vec<&str> = ids.iter().map(String::as_str).collect();
        let transport = Arc::new(ScriptedTransport::new(Ok(records(&ids))));
        let mut gov = governor(transport.clone());
        let engine = FetchEngine::new(FetchPolicy {
            max_transactions: 3000,
            ..FetchPolicy::default()
        });
        assert_eq!(engine.policy().max_transactions, MAX_TRANSACTIONS_PER_SYNC);
        let ctx = SyncContext::scheduled(Uuid::nil());

        let batch = engine
            .transactions(&mut gov, &ctx, &account(), &TransactionWindow::AfterId("t".into()))
            .await
            .unwrap();

        assert_eq!(batch.len(), MAX_TRANSACTIONS_PER_SYNC);
        assert_eq!(transport.calls(), 1);
    }
}

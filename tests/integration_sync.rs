//! Sync Integration Tests
//!
//! Full account sync over the in-memory store: fetch, reconcile, cursor.

use rust_decimal_macros::dec;
use serde_json::{json, Value};
use uuid::Uuid;

use tesote_sync::client::ApiError;
use tesote_sync::domain::{SyncContext, SyncStatus};
use tesote_sync::SyncError;

mod common;

use common::TestHarness;

fn three_transactions() -> Value {
    json!([
        {
            "id": "t1",
            "date": "2024-01-01T09:15:00Z",
            "amount_cents": 5000,
            "type": "debit",
            "description": "Pago proveedor"
        },
        {
            "id": "t3",
            "date": "2024-01-01",
            "amount_cents": -2500,
            "type": "credit",
            "description": "Cobro cliente"
        },
        {
            "id": "t2",
            "date": "2024-01-02",
            "amount_cents": 1000,
            "type": "debit",
            "description": ""
        }
    ])
}

#[tokio::test(start_paused = true)]
async fn test_first_sync_groups_lines_by_day() {
    let h = TestHarness::new(Ok(json!([])));
    let account = h.mapped_account("A1", "USD").await;
    h.transport
        .on("/accounts/A1/transactions", Ok(three_transactions()));

    let ctx = SyncContext::manual(Uuid::nil());
    let report = h.sync.sync_account(&ctx, account.id, None).await.unwrap();

    assert_eq!(report.status, SyncStatus::Success);
    assert_eq!(report.fetched, 3);
    assert_eq!(report.created, 3);
    assert_eq!(report.duplicates, 0);

    let mut statements = h.store.all_statements();
    statements.sort_by_key(|s| s.date);
    assert_eq!(statements.len(), 2);
    assert_eq!(statements[0].name, "TESOTE/20240101");
    assert_eq!(statements[1].name, "TESOTE/20240102");

    let lines = h.store.all_lines();
    let on_day = |statement_id: Uuid| lines.iter().filter(|l| l.statement_id == statement_id).count();
    assert_eq!(on_day(statements[0].id), 2);
    assert_eq!(on_day(statements[1].id), 1);

    let amount = |external_ref: &str| {
        lines
            .iter()
            .find(|l| l.external_ref == external_ref)
            .map(|l| l.amount)
            .unwrap()
    };
    assert_eq!(amount("t1"), dec!(-50.00));
    assert_eq!(amount("t3"), dec!(25.00));
    assert_eq!(amount("t2"), dec!(-10.00));

    // Empty description falls back to the reference
    let t2 = lines.iter().find(|l| l.external_ref == "t2").unwrap();
    assert_eq!(t2.payment_ref, "t2");

    let stored = h.account(account.id).await;
    assert_eq!(stored.sync_status, SyncStatus::Success);
    assert_eq!(stored.cursor.last_transaction_id.as_deref(), Some("t3"));
    assert!(stored.last_sync_at.is_some());

    // First sync uses the default date window
    let first = &h.transport.requests()[0];
    assert!(first.query_value("start_date").is_some());
    assert!(first.query_value("after_id").is_none());

    assert_eq!(h.store.api_logs().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_second_sync_is_incremental_and_idempotent() {
    let h = TestHarness::new(Ok(json!([])));
    let account = h.mapped_account("A1", "USD").await;
    h.transport
        .on("/accounts/A1/transactions", Ok(three_transactions()));
    h.transport
        .on("/accounts/A1/transactions", Ok(three_transactions()));

    let ctx = SyncContext::manual(Uuid::nil());
    h.sync.sync_account(&ctx, account.id, None).await.unwrap();
    let second = h.sync.sync_account(&ctx, account.id, None).await.unwrap();

    assert_eq!(second.created, 0);
    assert_eq!(second.duplicates, 3);
    assert_eq!(h.store.all_lines().len(), 3);
    assert_eq!(h.store.all_statements().len(), 2);

    let requests = h.transport.requests();
    let incremental = &requests[1];
    assert_eq!(incremental.query_value("after_id"), Some("t3"));
    assert!(incremental.query_value("start_date").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_sync_all_continues_past_failing_account() {
    let h = TestHarness::new(Ok(json!([])));
    let broken = h.mapped_account("A1", "USD").await;
    let healthy = h.mapped_account("A2", "USD").await;
    h.transport.on(
        "/accounts/A1/transactions",
        Err(ApiError::Client {
            status: 422,
            message: "invalid range".to_string(),
        }),
    );
    h.transport
        .on("/accounts/A2/transactions", Ok(three_transactions()));

    let report = h
        .sync
        .sync_all(&SyncContext::scheduled(Uuid::nil()))
        .await
        .unwrap();

    assert_eq!(report.accounts.len(), 2);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed, 1);

    assert_eq!(h.account(broken.id).await.sync_status, SyncStatus::Error);
    assert_eq!(h.account(healthy.id).await.sync_status, SyncStatus::Success);
    assert_eq!(h.store.all_lines().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_refresh_accounts_then_map_and_sync() {
    let h = TestHarness::new(Ok(json!([])));
    h.transport.on(
        "/accounts",
        Ok(json!({
            "data": [{
                "id": "A9",
                "bank_name": "Banco de Venezuela",
                "masked_account": "0102XXXX4321",
                "currency": "ves",
                "balance_cents": 150000
            }],
            "meta": {"total_pages": 1}
        })),
    );

    let ctx = SyncContext::manual(Uuid::nil());
    let refresh = h.sync.refresh_accounts(&ctx).await.unwrap();
    assert_eq!(refresh.discovered, 1);

    let account = h
        .sync
        .find_account(Uuid::nil(), "A9")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(account.currency(), "VES");
    assert_eq!(account.display_name(), "Banco de Venezuela ***4321");
    assert!(!account.is_syncable());

    // Unmapped accounts cannot be synced
    let result = h.sync.sync_account(&ctx, account.id, None).await;
    assert!(matches!(result, Err(SyncError::Domain(_))));

    let journal = h.journal("VES");
    let mapped = h
        .sync
        .update_mapping(
            account.id,
            tesote_sync::sync::MappingUpdate {
                journal_id: Some(journal.id),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(mapped.is_syncable());

    let report = h.sync.sync_account(&ctx, account.id, Some(3)).await.unwrap();
    assert_eq!(report.status, SyncStatus::Success);
    assert_eq!(report.fetched, 0);
}

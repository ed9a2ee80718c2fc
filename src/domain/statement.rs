//! Transactions and statements
//!
//! A `RemoteTransaction` is immutable once fetched. Statements group lines
//! by date; a line exists at most once per (statement, external reference).

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{MinorUnits, TransactionKind};

/// Transaction as reported by the remote API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTransaction {
    /// Unique per account; the idempotency key for statement lines
    pub external_id: String,
    pub date: NaiveDate,
    /// Amount exactly as sent upstream
    pub amount: MinorUnits,
    pub kind: TransactionKind,
    pub description: String,
    pub reference: String,
    pub counterpart_name: Option<String>,
    /// Tax id or other document of the counterpart
    pub counterpart_document: Option<String>,
}

impl RemoteTransaction {
    /// Amount after the local sign convention is applied
    pub fn signed_amount(&self) -> MinorUnits {
        self.kind.normalize(self.amount)
    }
}

/// Container for the lines of one date bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    pub id: Uuid,
    pub journal_id: Uuid,
    pub account_id: Uuid,
    pub name: String,
    pub date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

/// Statement to be created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStatement {
    pub journal_id: Uuid,
    pub account_id: Uuid,
    pub name: String,
    pub date: NaiveDate,
}

/// Append-only line of a statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementLine {
    pub id: Uuid,
    pub statement_id: Uuid,
    /// External transaction id
    pub external_ref: String,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub payment_ref: String,
    pub partner_name: Option<String>,
    pub partner_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Line to be created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStatementLine {
    pub statement_id: Uuid,
    pub external_ref: String,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub payment_ref: String,
    pub partner_name: Option<String>,
    pub partner_id: Option<Uuid>,
}

/// Partner found in the local directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnerRef {
    pub id: Uuid,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn txn(kind: TransactionKind, amount: i64) -> RemoteTransaction {
        RemoteTransaction {
            external_id: "t1".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            amount: MinorUnits::new(amount),
            kind,
            description: "Payment".to_string(),
            reference: "t1".to_string(),
            counterpart_name: None,
            counterpart_document: None,
        }
    }

    #[test]
    fn test_signed_amount_debit_and_credit() {
        assert_eq!(txn(TransactionKind::Debit, 50).signed_amount().value(), -50);
        assert_eq!(txn(TransactionKind::Credit, 50).signed_amount().value(), 50);
        assert_eq!(txn(TransactionKind::Credit, -50).signed_amount().value(), 50);
    }

    #[test]
    fn test_signed_amount_does_not_mutate_upstream_value() {
        let t = txn(TransactionKind::Debit, 50);
        let _ = t.signed_amount();
        assert_eq!(t.amount.value(), 50);
    }
}

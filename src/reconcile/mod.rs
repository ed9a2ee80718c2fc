//! Reconciliation Engine
//!
//! Turns fetched transactions into statement lines. Statements are located
//! or created per date bucket; a line is written at most once per
//! (statement, external reference), so replaying a batch is harmless.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;

use crate::domain::{
    DomainError, Journal, MappedAccount, NewStatement, NewStatementLine, RemoteTransaction,
    SyncContext,
};
use crate::store::{LineInsert, PartnerDirectory, StatementRepository};

/// Transaction that could not be stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineFailure {
    pub external_id: String,
    pub error: String,
}

/// Outcome of reconciling one batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub created: usize,
    pub duplicates: usize,
    pub failures: Vec<LineFailure>,
}

impl ReconcileReport {
    /// Every transaction is stored, now or by an earlier run
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn total(&self) -> usize {
        self.created + self.duplicates + self.failures.len()
    }

    fn fail(&mut self, txn: &RemoteTransaction, error: impl ToString) {
        self.failures.push(LineFailure {
            external_id: txn.external_id.clone(),
            error: error.to_string(),
        });
    }
}

struct Bucket<'a> {
    name: String,
    date: NaiveDate,
    transactions: Vec<&'a RemoteTransaction>,
}

pub struct ReconciliationEngine {
    statements: Arc<dyn StatementRepository>,
    partners: Arc<dyn PartnerDirectory>,
}

impl ReconciliationEngine {
    pub fn new(
        statements: Arc<dyn StatementRepository>,
        partners: Arc<dyn PartnerDirectory>,
    ) -> Self {
        Self {
            statements,
            partners,
        }
    }

    /// Store `transactions` as lines of `account` in `journal`.
    ///
    /// Fails only on a mapping problem; storage failures are collected per
    /// transaction in the report.
    pub async fn reconcile(
        &self,
        ctx: &SyncContext,
        account: &MappedAccount,
        journal: &Journal,
        transactions: &[RemoteTransaction],
    ) -> Result<ReconcileReport, DomainError> {
        if journal.currency != account.currency() {
            return Err(DomainError::currency_mismatch(
                journal.currency.clone(),
                account.currency(),
            ));
        }

        let mut report = ReconcileReport::default();

        for bucket in self.buckets(&account.statement_prefix, transactions) {
            let statement = match self.locate_statement(account, journal, &bucket).await {
                Ok(statement) => statement,
                Err(e) => {
                    tracing::error!(
                        account_id = %account.id,
                        statement = %bucket.name,
                        error = %e,
                        correlation_id = %ctx.correlation_id,
                        "Failed to create statement"
                    );
                    for txn in &bucket.transactions {
                        report.fail(txn, &e);
                    }
                    continue;
                }
            };

            for txn in bucket.transactions {
                match self.store_line(ctx, account, statement.id, txn).await {
                    Ok(LineInsert::Created(_)) => report.created += 1,
                    Ok(LineInsert::Duplicate) => report.duplicates += 1,
                    Err(e) => {
                        tracing::error!(
                            account_id = %account.id,
                            external_id = %txn.external_id,
                            error = %e,
                            correlation_id = %ctx.correlation_id,
                            "Failed to store statement line"
                        );
                        report.fail(txn, e);
                    }
                }
            }
        }

        tracing::info!(
            account_id = %account.id,
            created = report.created,
            duplicates = report.duplicates,
            failures = report.failures.len(),
            trigger = %ctx.trigger,
            correlation_id = %ctx.correlation_id,
            "Reconciled transactions"
        );
        Ok(report)
    }

    fn buckets<'a>(&self, prefix: &str, transactions: &'a [RemoteTransaction]) -> Vec<Bucket<'a>> {
        let mut by_date: BTreeMap<NaiveDate, Vec<&'a RemoteTransaction>> = BTreeMap::new();
        for txn in transactions {
            by_date.entry(txn.date).or_default().push(txn);
        }

        // A transaction always lands in the statement of its own date, so a
        // replayed id meets its earlier line whatever else the batch holds.
        by_date
            .into_iter()
            .map(|(date, transactions)| Bucket {
                name: format!("{}{}", prefix, date.format("%Y%m%d")),
                date,
                transactions,
            })
            .collect()
    }

    async fn locate_statement(
        &self,
        account: &MappedAccount,
        journal: &Journal,
        bucket: &Bucket<'_>,
    ) -> Result<crate::domain::Statement, crate::store::StoreError> {
        if let Some(existing) = self
            .statements
            .find_statement(journal.id, &bucket.name, bucket.date)
            .await?
        {
            return Ok(existing);
        }

        self.statements
            .create_statement(&NewStatement {
                journal_id: journal.id,
                account_id: account.id,
                name: bucket.name.clone(),
                date: bucket.date,
            })
            .await
    }

    async fn store_line(
        &self,
        ctx: &SyncContext,
        account: &MappedAccount,
        statement_id: uuid::Uuid,
        txn: &RemoteTransaction,
    ) -> Result<LineInsert, crate::store::StoreError> {
        if self
            .statements
            .find_line(statement_id, &txn.external_id)
            .await?
            .is_some()
        {
            return Ok(LineInsert::Duplicate);
        }

        let mut partner_name = txn.counterpart_name.clone();
        let mut partner_id = None;
        if let Some(document) = &txn.counterpart_document {
            match self.partners.find_by_document(ctx.company_id, document).await {
                Ok(Some(partner)) => {
                    partner_id = Some(partner.id);
                    partner_name = Some(partner.name);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(document = %document, error = %e, "Partner lookup failed");
                }
            }
        }

        let payment_ref = if txn.description.is_empty() {
            txn.reference.clone()
        } else {
            txn.description.clone()
        };

        self.statements
            .create_line(&NewStatementLine {
                statement_id,
                external_ref: txn.external_id.clone(),
                date: txn.date,
                amount: txn.signed_amount().to_decimal(account.currency()),
                payment_ref,
                partner_name,
                partner_id,
            })
            .await
    }
}

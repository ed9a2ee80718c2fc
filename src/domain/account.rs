//! Account records
//!
//! `RemoteAccount` is the snapshot owned by the bank aggregator.
//! `MappedAccount` wraps it with the operator mapping and the sync cursor.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::{DomainError, MinorUnits};

/// Prefix given to statements of newly discovered accounts
pub const DEFAULT_STATEMENT_PREFIX: &str = "TESOTE/";

/// Account as reported by the remote API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteAccount {
    /// Stable external identifier
    pub external_id: String,
    pub name: Option<String>,
    pub bank_name: String,
    pub masked_account: String,
    /// ISO currency code
    pub currency: String,
    pub legal_entity_id: Option<String>,
    pub legal_entity_name: String,
    pub balance: MinorUnits,
}

/// Sync status of a mapped account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Never,
    Syncing,
    Success,
    Error,
}

impl From<String> for SyncStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "syncing" => SyncStatus::Syncing,
            "success" => SyncStatus::Success,
            "error" => SyncStatus::Error,
            _ => SyncStatus::Never,
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStatus::Never => write!(f, "never"),
            SyncStatus::Syncing => write!(f, "syncing"),
            SyncStatus::Success => write!(f, "success"),
            SyncStatus::Error => write!(f, "error"),
        }
    }
}

/// Position reached by the last committed sync
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCursor {
    pub last_transaction_id: Option<String>,
    pub last_transaction_date: Option<NaiveDate>,
}

impl SyncCursor {
    pub fn new(last_transaction_id: impl Into<String>, last_transaction_date: NaiveDate) -> Self {
        Self {
            last_transaction_id: Some(last_transaction_id.into()),
            last_transaction_date: Some(last_transaction_date),
        }
    }

    /// Incremental syncs are only possible once a transaction id is known
    pub fn is_empty(&self) -> bool {
        self.last_transaction_id.is_none()
    }
}

/// Local ledger journal that statements are written to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Journal {
    pub id: Uuid,
    pub company_id: Uuid,
    pub name: String,
    pub currency: String,
}

/// Local record for a remote account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappedAccount {
    pub id: Uuid,
    pub company_id: Uuid,
    pub remote: RemoteAccount,

    // Operator mapping
    pub journal_id: Option<Uuid>,
    pub statement_prefix: String,
    pub active: bool,

    // Sync state
    pub cursor: SyncCursor,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub sync_status: SyncStatus,
    pub sync_error: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MappedAccount {
    /// Record for an account seen for the first time
    pub fn discovered(company_id: Uuid, remote: RemoteAccount) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            company_id,
            remote,
            journal_id: None,
            statement_prefix: DEFAULT_STATEMENT_PREFIX.to_string(),
            active: true,
            cursor: SyncCursor::default(),
            last_sync_at: None,
            sync_status: SyncStatus::Never,
            sync_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn external_id(&self) -> &str {
        &self.remote.external_id
    }

    pub fn currency(&self) -> &str {
        &self.remote.currency
    }

    /// "Bank ***1234 (Entity)"
    pub fn display_name(&self) -> String {
        let mut parts = Vec::new();
        if !self.remote.bank_name.is_empty() {
            parts.push(self.remote.bank_name.clone());
        }
        if !self.remote.masked_account.is_empty() {
            let digits: Vec<char> = self.remote.masked_account.chars().collect();
            let tail: String = digits[digits.len().saturating_sub(4)..].iter().collect();
            parts.push(format!("***{}", tail));
        }
        if !self.remote.legal_entity_name.is_empty() {
            parts.push(format!("({})", self.remote.legal_entity_name));
        }
        if parts.is_empty() {
            "Tesote Account".to_string()
        } else {
            parts.join(" ")
        }
    }

    /// Active and mapped to a journal
    pub fn is_syncable(&self) -> bool {
        self.active && self.journal_id.is_some()
    }

    /// Map the account to a journal, enforcing the currency invariant.
    pub fn map_to_journal(&mut self, journal: &Journal) -> Result<(), DomainError> {
        if journal.currency != self.remote.currency {
            return Err(DomainError::currency_mismatch(
                journal.currency.clone(),
                self.remote.currency.clone(),
            ));
        }
        self.journal_id = Some(journal.id);
        Ok(())
    }

    /// Replace the remote snapshot, keeping mapping and cursor.
    pub fn refresh_snapshot(&mut self, remote: RemoteAccount) {
        self.remote = remote;
        self.updated_at = Utc::now();
    }

    /// Journal id or the error a sync should report
    pub fn require_journal(&self) -> Result<Uuid, DomainError> {
        self.journal_id
            .ok_or_else(|| DomainError::AccountNotMapped(self.display_name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(currency: &str) -> RemoteAccount {
        RemoteAccount {
            external_id: "acc_1".to_string(),
            name: Some("Operating".to_string()),
            bank_name: "Banco Nacional".to_string(),
            masked_account: "0102XXXX5678".to_string(),
            currency: currency.to_string(),
            legal_entity_id: None,
            legal_entity_name: "Almus CA".to_string(),
            balance: MinorUnits::new(10_000),
        }
    }

    fn journal(currency: &str) -> Journal {
        Journal {
            id: Uuid::new_v4(),
            company_id: Uuid::nil(),
            name: "Bank".to_string(),
            currency: currency.to_string(),
        }
    }

    #[test]
    fn test_discovered_defaults() {
        let account = MappedAccount::discovered(Uuid::nil(), remote("VES"));
        assert_eq!(account.sync_status, SyncStatus::Never);
        assert_eq!(account.statement_prefix, "TESOTE/");
        assert!(account.active);
        assert!(account.cursor.is_empty());
        assert!(!account.is_syncable());
    }

    #[test]
    fn test_display_name() {
        let account = MappedAccount::discovered(Uuid::nil(), remote("VES"));
        assert_eq!(account.display_name(), "Banco Nacional ***5678 (Almus CA)");
    }

    #[test]
    fn test_display_name_fallback() {
        let mut r = remote("VES");
        r.bank_name.clear();
        r.masked_account.clear();
        r.legal_entity_name.clear();
        let account = MappedAccount::discovered(Uuid::nil(), r);
        assert_eq!(account.display_name(), "Tesote Account");
    }

    #[test]
    fn test_map_to_journal_currency_must_match() {
        let mut account = MappedAccount::discovered(Uuid::nil(), remote("VES"));

        let err = account.map_to_journal(&journal("USD")).unwrap_err();
        assert!(matches!(err, DomainError::CurrencyMismatch { .. }));
        assert!(account.journal_id.is_none());

        let ves = journal("VES");
        account.map_to_journal(&ves).unwrap();
        assert_eq!(account.journal_id, Some(ves.id));
        assert!(account.is_syncable());
    }

    #[test]
    fn test_refresh_snapshot_keeps_mapping() {
        let mut account = MappedAccount::discovered(Uuid::nil(), remote("VES"));
        let ves = journal("VES");
        account.map_to_journal(&ves).unwrap();
        account.statement_prefix = "BNC/".to_string();

        let mut updated = remote("VES");
        updated.balance = MinorUnits::new(99);
        account.refresh_snapshot(updated);

        assert_eq!(account.journal_id, Some(ves.id));
        assert_eq!(account.statement_prefix, "BNC/");
        assert_eq!(account.remote.balance.value(), 99);
    }

    #[test]
    fn test_sync_status_roundtrip_strings() {
        assert_eq!(SyncStatus::from("syncing".to_string()), SyncStatus::Syncing);
        assert_eq!(SyncStatus::from("bogus".to_string()), SyncStatus::Never);
        assert_eq!(SyncStatus::Error.to_string(), "error");
    }
}

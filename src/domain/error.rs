//! Domain Error Types
//!
//! Pure domain errors that don't depend on infrastructure.

use thiserror::Error;

/// Invariant violations on local records and malformed remote records.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// Journal currency differs from the account currency
    #[error("The journal currency ({journal}) must match the account currency ({account})")]
    CurrencyMismatch { journal: String, account: String },

    /// Account not found
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// Journal not found
    #[error("Journal not found: {0}")]
    JournalNotFound(String),

    /// Account has no journal mapping
    #[error("No journal configured for account {0}")]
    AccountNotMapped(String),

    /// Account is soft-deactivated
    #[error("Account is not active: {0}")]
    AccountInactive(String),

    /// A remote record is missing a field or carries an unusable value
    #[error("Invalid remote record: {0}")]
    InvalidRecord(String),
}

impl DomainError {
    pub fn currency_mismatch(journal: impl Into<String>, account: impl Into<String>) -> Self {
        Self::CurrencyMismatch {
            journal: journal.into(),
            account: account.into(),
        }
    }

    pub fn invalid_record(reason: impl Into<String>) -> Self {
        Self::InvalidRecord(reason.into())
    }

    /// Check if this is a client error (operator's fault)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::CurrencyMismatch { .. }
                | Self::AccountNotMapped(_)
                | Self::AccountInactive(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_mismatch_error() {
        let err = DomainError::currency_mismatch("USD", "VES");

        assert!(err.is_client_error());
        assert!(err.to_string().contains("USD"));
        assert!(err.to_string().contains("VES"));
    }

    #[test]
    fn test_invalid_record_not_client_error() {
        let err = DomainError::invalid_record("missing id");
        assert!(!err.is_client_error());
        assert!(err.to_string().contains("missing id"));
    }
}

//! Minor-unit amounts
//!
//! Remote balances and transaction amounts arrive as integer minor units
//! (cents). They stay integers until a statement line is written, where
//! they are converted to a `Decimal` at the currency's scale.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Scale used when a currency is not listed in [`currency_scale`]
const DEFAULT_SCALE: u32 = 2;

/// Number of decimal places for an ISO currency code.
pub fn currency_scale(currency: &str) -> u32 {
    match currency {
        "JPY" | "KRW" | "CLP" | "PYG" => 0,
        "KWD" | "BHD" | "OMR" => 3,
        _ => DEFAULT_SCALE,
    }
}

/// Signed amount in integer minor units.
///
/// # Example
/// ```
/// use rust_decimal::Decimal;
/// use tesote_sync::domain::MinorUnits;
///
/// let amount = MinorUnits::new(-1050);
/// assert_eq!(amount.to_decimal("USD"), Decimal::new(-1050, 2));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MinorUnits(i64);

impl MinorUnits {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn zero() -> Self {
        Self(0)
    }

    /// Raw integer value
    pub fn value(&self) -> i64 {
        self.0
    }

    /// Absolute value, saturating at `i64::MAX` for `i64::MIN`.
    pub fn abs(&self) -> Self {
        Self(self.0.saturating_abs())
    }

    pub fn negate(&self) -> Self {
        Self(self.0.saturating_neg())
    }

    /// Convert to a decimal amount in major units of `currency`.
    pub fn to_decimal(&self, currency: &str) -> Decimal {
        Decimal::new(self.0, currency_scale(currency))
    }
}

impl fmt::Display for MinorUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for MinorUnits {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Direction of a remote transaction as reported upstream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Debit,
    Credit,
    Other,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Debit => "debit",
            TransactionKind::Credit => "credit",
            TransactionKind::Other => "other",
        }
    }

    /// Apply the local sign convention to an upstream amount.
    ///
    /// Debits are always negative and credits always positive, whatever
    /// sign the remote system sent. Other kinds keep the upstream sign.
    pub fn normalize(&self, amount: MinorUnits) -> MinorUnits {
        match self {
            TransactionKind::Debit => amount.abs().negate(),
            TransactionKind::Credit => amount.abs(),
            TransactionKind::Other => amount,
        }
    }
}

impl From<&str> for TransactionKind {
    fn from(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "debit" | "withdrawal" => TransactionKind::Debit,
            "credit" | "deposit" => TransactionKind::Credit,
            _ => TransactionKind::Other,
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

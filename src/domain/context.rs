//! Sync Context
//!
//! Explicit per-invocation metadata threaded through every fetch and
//! reconciliation call.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// What started a sync invocation. Decides whether failures are surfaced
/// to the caller or only recorded on the account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTrigger {
    Manual,
    Scheduled,
    Webhook,
}

impl SyncTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncTrigger::Manual => "manual",
            SyncTrigger::Scheduled => "scheduled",
            SyncTrigger::Webhook => "webhook",
        }
    }

    /// Manual invocations return errors to the operator
    pub fn surfaces_errors(&self) -> bool {
        matches!(self, SyncTrigger::Manual)
    }
}

impl fmt::Display for SyncTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Context for one sync invocation, used for scoping, auditing and tracing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncContext {
    /// Company that owns the accounts being synchronized
    pub company_id: Uuid,

    pub trigger: SyncTrigger,

    /// Correlation ID for request tracing
    pub correlation_id: Uuid,

    /// Calendar date the invocation treats as "today"
    pub today: NaiveDate,
}

impl SyncContext {
    pub fn new(company_id: Uuid, trigger: SyncTrigger) -> Self {
        Self {
            company_id,
            trigger,
            correlation_id: Uuid::new_v4(),
            today: Utc::now().date_naive(),
        }
    }

    pub fn manual(company_id: Uuid) -> Self {
        Self::new(company_id, SyncTrigger::Manual)
    }

    pub fn scheduled(company_id: Uuid) -> Self {
        Self::new(company_id, SyncTrigger::Scheduled)
    }

    pub fn webhook(company_id: Uuid) -> Self {
        Self::new(company_id, SyncTrigger::Webhook)
    }

    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    /// Pin "today" (used by tests and replays)
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }
}

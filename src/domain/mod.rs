//! Domain module
//!
//! Core domain types: accounts, transactions, statements and webhook
//! endpoints, plus the sync context threaded through every operation.

pub mod account;
pub mod amount;
pub mod context;
pub mod error;
pub mod statement;
pub mod webhook;

pub use account::{
    Journal, MappedAccount, RemoteAccount, SyncCursor, SyncStatus, DEFAULT_STATEMENT_PREFIX,
};
pub use amount::{currency_scale, MinorUnits, TransactionKind};
pub use context::{SyncContext, SyncTrigger};
pub use error::DomainError;
pub use statement::{
    NewStatement, NewStatementLine, PartnerRef, RemoteTransaction, Statement, StatementLine,
};
pub use webhook::{generate_secret, WebhookEndpoint, WebhookEventKind, WebhookSubscriptions};

//! Sync module
//!
//! Orchestrates fetch, reconciliation and sync-state bookkeeping for the
//! manual, scheduled and webhook entry points.

mod error;
mod service;

pub use error::SyncError;
pub use service::{
    AccountSyncReport, MappingUpdate, RefreshReport, SyncAllReport, SyncService, SyncSettings,
};

//! tesote-sync Library
//!
//! Re-exports modules for integration testing and external use.

pub mod api;
pub mod audit;
pub mod client;
pub mod domain;
pub mod fetch;
pub mod governor;
pub mod jobs;
pub mod reconcile;
pub mod store;
pub mod sync;
pub mod webhook;

pub mod config;
pub mod db;
mod error;

pub use api::{build_router, ApiSettings, AppState};
pub use config::Config;
pub use error::{AppError, AppResult};
pub use domain::{DomainError, MinorUnits, SyncContext, SyncTrigger};
pub use sync::{SyncError, SyncService, SyncSettings};

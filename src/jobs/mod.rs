//! Scheduled Jobs
//!
//! Periodic sync of every active mapped account. Runs only when
//! `TESOTE_AUTO_SYNC` is on; failures are recorded per account and the
//! scheduler keeps ticking.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use uuid::Uuid;

use crate::domain::SyncContext;
use crate::sync::{SyncAllReport, SyncError, SyncService};

// =========================================================================
// Job Scheduler
// =========================================================================

/// Configuration for job scheduler
#[derive(Debug, Clone)]
pub struct JobSchedulerConfig {
    /// Interval between full syncs (default: 24 hours)
    pub sync_interval: Duration,
    /// Company whose accounts the scheduled sync covers
    pub company_id: Uuid,
}

impl Default for JobSchedulerConfig {
    fn default() -> Self {
        Self {
            sync_interval: Duration::from_secs(86_400),
            company_id: Uuid::nil(),
        }
    }
}

/// Job Scheduler - runs the periodic account sync
pub struct JobScheduler {
    sync: Arc<SyncService>,
    config: JobSchedulerConfig,
}

impl JobScheduler {
    /// Create with custom configuration
    pub fn with_config(sync: Arc<SyncService>, config: JobSchedulerConfig) -> Self {
        Self { sync, config }
    }

    /// Start the job scheduler in the background. The loop exits once
    /// `shutdown` flips to `true`.
    pub fn start(self, shutdown: watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run(shutdown).await;
        })
    }

    async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            interval_secs = self.config.sync_interval.as_secs(),
            "Job scheduler started"
        );

        let mut sync_interval = interval(self.config.sync_interval);
        sync_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; skip it so startup does not sync
        sync_interval.tick().await;

        loop {
            tokio::select! {
                _ = sync_interval.tick() => {
                    if let Err(e) = self.run_once().await {
                        tracing::error!(error = %e, "Scheduled sync failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("Job scheduler stopped");
                        break;
                    }
                }
            }
        }
    }

    /// Run one scheduled sync (for manual trigger or testing)
    pub async fn run_once(&self) -> Result<SyncAllReport, JobError> {
        let ctx = SyncContext::scheduled(self.config.company_id);
        let report = self.sync.sync_all(&ctx).await?;

        if report.failed > 0 {
            tracing::warn!(
                succeeded = report.succeeded,
                failed = report.failed,
                "Scheduled sync finished with failures"
            );
        }
        Ok(report)
    }
}

/// Job execution errors
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),
}

// =========================================================================
// Tests
// =========================================================================

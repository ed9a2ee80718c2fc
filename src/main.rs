//! tesote-sync - Tesote bank synchronization service
//!
//! Pulls bank accounts and transactions from the Tesote aggregator API into
//! bank statements, and receives signed Tesote webhooks.

use std::net::SocketAddr;
use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tesote_sync::audit::PgApiLogSink;
use tesote_sync::client::{HttpTransport, TesoteClient};
use tesote_sync::jobs::{JobScheduler, JobSchedulerConfig};
use tesote_sync::store::{PgStore, Repositories};
use tesote_sync::{build_router, db, ApiSettings, AppState, Config, SyncService, SyncSettings};

/// Initialize tracing/logging
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tesote_sync=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    let config = Config::from_env()?;
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tracing::info!(environment = %config.environment, "Starting tesote-sync server");
    tracing::info!("Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;

    if !db::check_schema(&pool).await? {
        tracing::error!("Database schema is not complete. Please run migrations.");
        return Err(anyhow::anyhow!("Database schema incomplete"));
    }

    tracing::info!("Database connected successfully");

    let client = match config.tesote.api_token.as_deref() {
        Some(token) => {
            let transport = HttpTransport::new(&config.tesote.api_url, token)?;
            let audit = PgApiLogSink::new(pool.clone());
            Some(Arc::new(TesoteClient::new(Arc::new(transport), Arc::new(audit))))
        }
        None => {
            tracing::warn!("TESOTE_API_TOKEN is not set; sync operations are disabled");
            None
        }
    };

    let repos = Repositories::from_store(Arc::new(PgStore::new(pool.clone())));
    let sync = Arc::new(SyncService::new(
        client,
        repos,
        SyncSettings::from(&config.tesote),
    ));

    if config.admin_api_key.is_none() {
        tracing::warn!("ADMIN_API_KEY is not set; admin routes reject every request");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = if config.tesote.auto_sync && sync.is_configured() {
        let scheduler = JobScheduler::with_config(
            sync.clone(),
            JobSchedulerConfig {
                sync_interval: config.tesote.sync_interval,
                company_id: config.tesote.company_id,
            },
        );
        Some(scheduler.start(shutdown_rx))
    } else {
        tracing::info!("Scheduled sync is disabled");
        None
    };

    let app = build_router(AppState::new(sync, ApiSettings::from(&config)));

    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutting down...");
    let _ = shutdown_tx.send(true);
    if let Some(handle) = scheduler {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Job scheduler did not stop cleanly");
        }
    }

    pool.close().await;
    tracing::info!("Database connections closed. Goodbye!");

    Ok(())
}

/// Shutdown signal handler for graceful shutdown
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

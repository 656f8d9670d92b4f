//! Custsync Server - Main entry point

use anyhow::Result;
use custsync_common::logging::{init_logging, LogConfig};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tracing::{info, warn};

use custsync_server::{
    api::{self, ApiState},
    config::Config,
    db,
    sheets::{self, SheetsAccess, SheetsClient},
    sync::{RateGate, ReconciliationEngine, SyncService, SyncStatusTracker},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Environment variables take precedence over these defaults
    let log_config = LogConfig::builder()
        .log_file_prefix("custsync-server")
        .filter_directives("custsync_server=debug,tower_http=debug,sqlx=info")
        .build()
        .merge_env()?;

    let _log_guard = init_logging(&log_config)?;

    info!("Starting custsync server");

    let config = Config::load()?;
    info!(
        "Configuration loaded - server will bind to {}:{}",
        config.server.host, config.server.port
    );

    let db_pool = db::create_pool(&config.database).await?;
    db::run_migrations(&db_pool).await?;

    let tracker = SyncStatusTracker::new(config.sync.rate_window())
        .with_request_budget(config.sync.max_requests_per_window);
    let gate = Arc::new(RateGate::new(Arc::new(tracker)));

    let state: ApiState<SheetsClient, sqlx::PgPool> =
        match sheets::resolve_credentials(&config.sheets)? {
            SheetsAccess::Authenticated(client) => {
                let document = sheets::document_ref(&config.sheets)?;
                info!(
                    spreadsheet_id = %document.document_id,
                    range = %document.range,
                    "Sheets sync enabled"
                );
                let engine = ReconciliationEngine::new(client, document);
                let service = SyncService::new(gate, engine, db_pool.clone());
                ApiState::ready(service, Some(db_pool))
            }
            SheetsAccess::NeedsConsent { auth_url } => {
                warn!(%auth_url, "Sheets token missing - sync requests will ask for consent");
                ApiState::needs_consent(auth_url, gate, Some(db_pool))
            }
        };

    let app = api::router(state, &config.cors);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(config.server.shutdown_timeout_secs))
        .await?;

    info!("Server shut down gracefully");

    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal(timeout_secs: u64) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }

    // Give in-flight syncs time to finish their permit
    info!("Waiting up to {} seconds for connections to close", timeout_secs);
    tokio::time::sleep(Duration::from_secs(timeout_secs.min(5))).await;
}

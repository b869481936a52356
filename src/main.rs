use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::info;

use catalog_sync_lib::application::Scheduler;
use catalog_sync_lib::domain::{CatalogSource, CatalogStore};
use catalog_sync_lib::infrastructure::{
    AppConfig, DatabaseConnection, PgCatalogStore, SpreadsheetSource, UploadStore,
    init_logging_with_config,
};
use catalog_sync_lib::{AppState, router};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load().context("Failed to load configuration")?;
    let _log_guard = init_logging_with_config(&config.logging)?;

    let database = DatabaseConnection::new(&config.database)
        .await
        .context("Failed to connect to database")?;
    database.migrate().await.context("Failed to apply migrations")?;

    let store: Arc<dyn CatalogStore> = Arc::new(PgCatalogStore::new(database.pool().clone()));
    let source: Arc<dyn CatalogSource> = Arc::new(SpreadsheetSource::new());
    let scheduler = Arc::new(Scheduler::new(config.scheduler_config(), source, Arc::clone(&store)));
    let uploads = UploadStore::new(&config.uploads.dir);

    let app = router(AppState::new(scheduler, store, uploads));

    let address = config.bind_address();
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;
    info!(%address, uploads = %config.uploads.dir, "catalog-sync listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    database.close().await;
    info!("catalog-sync stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
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
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received");
}

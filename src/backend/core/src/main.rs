//! Warden Server - Main entry point

use std::net::SocketAddr;
use std::sync::Arc;

use warden_core::{
    api::{self, AppState},
    config::Config,
    engine::AccessEngine,
    seed,
    store::{AuditLog, CredentialStore, MemoryStore, PgStore, SeedTarget},
    telemetry,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = match std::env::var("WARDEN_CONFIG") {
        Ok(path) => Config::from_file(&path)?,
        Err(_) => Config::load()?,
    };

    let telemetry = telemetry::init(&config.observability)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting Warden Server");

    // Pick the credential store
    let (store, audit_log, seed_target): (
        Arc<dyn CredentialStore>,
        Arc<dyn AuditLog>,
        Arc<dyn SeedTarget>,
    ) = match config.database.url {
        Some(ref url) => {
            let pg = Arc::new(PgStore::connect(url, &config.database).await?);
            pg.migrate().await?;
            tracing::info!("Connected to database, migrations applied");
            (
                pg.clone() as Arc<dyn CredentialStore>,
                pg.clone() as Arc<dyn AuditLog>,
                pg as Arc<dyn SeedTarget>,
            )
        }
        None => {
            tracing::warn!("No database configured, using the in-memory store");
            let memory = Arc::new(MemoryStore::new());
            (
                memory.clone() as Arc<dyn CredentialStore>,
                memory.clone() as Arc<dyn AuditLog>,
                memory as Arc<dyn SeedTarget>,
            )
        }
    };

    seed::seed_defaults(seed_target.as_ref()).await?;
    if let Some(ref password) = config.auth.bootstrap_admin_password {
        if seed::bootstrap_admin(store.as_ref(), password).await? {
            tracing::info!("Bootstrap admin account created");
        }
    }
    if config.auth.seed_demo_users {
        seed::seed_demo_users(store.as_ref()).await?;
    }

    let engine = Arc::new(AccessEngine::from_config(&config, store)?);

    let app_state = AppState {
        engine: engine.clone(),
        audit_log,
        metrics: telemetry.metrics.clone(),
    };
    let app = api::build_router(app_state)?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!(address = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Cleanup
    engine.auditor().shutdown(config.audit.drain_timeout).await;
    telemetry.shutdown();

    Ok(())
}

/// Wait for shutdown signal.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

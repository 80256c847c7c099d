//! Kontrol coordinator binary.
//!
//! Loads configuration from the environment, connects to Postgres (running
//! migrations when `KONTROL_AUTO_MIGRATE` is set), and serves the internal
//! worker API until SIGINT/SIGTERM.
use anyhow::{Context, Result};
use coordinator::app::{build_router, AppState};
use coordinator::config::ApiConfig;
use coordinator::observability;
use coordinator::store::postgres::PostgresStore;
use coordinator::store::CoordinatorStore;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let config = ApiConfig::from_env()?;
    let store = PostgresStore::connect(&config)
        .await
        .context("connect to store")?;
    let store: Arc<dyn CoordinatorStore> = Arc::new(store);
    info!(backend = store.backend_name(), "store connected");

    let router = build_router(AppState { store });
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    info!(%addr, "coordinator listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serve")?;

    info!("coordinator stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };
    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

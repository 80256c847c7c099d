//! Kontrol worker binary.
//!
//! Registers its cluster with the coordinator, then runs the reconciler,
//! watcher, and global syncer until SIGINT/SIGTERM.
use anyhow::Result;
use worker::config::WorkerConfig;
use worker::observability;
use worker::supervisor::Worker;

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let config = WorkerConfig::from_env()?;
    let mut worker = Worker::start(&config).await?;

    tokio::select! {
        _ = shutdown_signal() => {}
        _ = worker.wait() => {}
    }
    worker.stop().await;
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

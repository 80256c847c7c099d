//! Worker supervisor: boot, loop spawning, fan-in shutdown.
use crate::config::WorkerConfig;
use crate::global_syncer::GlobalSyncer;
use crate::k8s;
use crate::reconciler::Reconciler;
use crate::watcher::Watcher;
use anyhow::{Context, Result};
use kontrol_client::ApiClient;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// One worker process: a reconciler, a global syncer, and one watch task per
/// supported kind, all sharing a cancellation token.
pub struct Worker {
    cancel: CancellationToken,
    tasks: JoinSet<()>,
}

impl Worker {
    /// Register the cluster and start every loop. Registration failure aborts
    /// startup; nothing else on the happy path is fatal.
    pub async fn start(config: &WorkerConfig) -> Result<Worker> {
        let api = ApiClient::new(&config.api_url, &config.api_key, &config.cluster_id)
            .context("build api client")?;
        api.register_cluster().await.context("register cluster")?;
        info!(cluster_id = %config.cluster_id, "cluster registered");

        let kube = k8s::build_client(config.kubeconfig.as_deref())
            .await
            .context("build kubernetes client")?;
        let kinds = k8s::supported_kinds(&config.supported_gvrs);
        info!(kinds = kinds.len(), "supported kinds resolved");

        let cancel = CancellationToken::new();
        let mut tasks = JoinSet::new();
        tasks.spawn(Watcher::new(api.clone(), kube.clone(), kinds).run(cancel.child_token()));
        tasks.spawn(Reconciler::new(api.clone(), kube.clone()).run(cancel.child_token()));
        tasks.spawn(GlobalSyncer::new(api).run(cancel.child_token()));

        Ok(Worker { cancel, tasks })
    }

    /// Block until every loop exits (they only exit on cancellation).
    pub async fn wait(&mut self) {
        while self.tasks.join_next().await.is_some() {}
    }

    /// Cancel the loops and wait for each to observe it at its next
    /// suspension point. There is no forced kill.
    pub async fn stop(mut self) {
        info!("shutting down worker");
        self.cancel.cancel();
        self.wait().await;
        info!("worker stopped");
    }
}

//! Global syncer loop: fans global resources out into this cluster.
//!
//! # Purpose
//! Polls the coordinator for global resources this cluster is behind on and
//! materializes each into a per-cluster resource, then records the reached
//! generation. Deleted globals are handed to the reconciler through the
//! normal soft-delete path.
//!
//! # Ordering
//! The resource upsert always lands before the synced-state write. A crash
//! between the two leaves the synced generation behind the materialized
//! spec, so the next pass simply redoes the (idempotent) upsert.
use kontrol_client::types::{CreateResourceRequest, GlobalResource};
use kontrol_client::{ApiClient, ClientResult};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const POLL_INTERVAL: Duration = Duration::from_secs(10);
const BATCH_LIMIT: i64 = 100;

pub struct GlobalSyncer {
    api: ApiClient,
}

impl GlobalSyncer {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub async fn run(self, cancel: CancellationToken) {
        info!(cluster_id = %self.api.cluster_id(), "global syncer started");
        loop {
            self.sync_once().await;
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("global syncer stopped");
                    return;
                }
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
            }
        }
    }

    async fn sync_once(&self) {
        match self.api.list_out_of_sync_global_resources(BATCH_LIMIT).await {
            Ok(globals) => {
                for global in globals {
                    if let Err(err) = self.sync_one(&global).await {
                        warn!(global_resource_id = %global.id, error = %err, "sync failed");
                    }
                }
            }
            Err(err) => warn!(error = %err, "failed to list out-of-sync global resources"),
        }

        match self.api.list_deleted_global_resources(BATCH_LIMIT).await {
            Ok(globals) => {
                for global in globals {
                    if let Err(err) = self.cleanup_one(&global).await {
                        warn!(global_resource_id = %global.id, error = %err, "cleanup failed");
                    }
                }
            }
            Err(err) => warn!(error = %err, "failed to list deleted global resources"),
        }
    }

    async fn sync_one(&self, global: &GlobalResource) -> ClientResult<()> {
        // Upsert by key: a per-cluster resource with the same key is taken
        // over by the global rather than duplicated.
        self.api
            .create_resource(&CreateResourceRequest {
                namespace: global.namespace.clone(),
                kind: global.kind.clone(),
                name: global.name.clone(),
                api_version: global.api_version.clone(),
                desired_spec: global.desired_spec.clone(),
                revision: global.revision,
            })
            .await?;

        self.api
            .upsert_synced_state(global.id, global.generation)
            .await?;

        info!(
            global_resource_id = %global.id,
            generation = global.generation,
            "global resource materialized"
        );
        Ok(())
    }

    async fn cleanup_one(&self, global: &GlobalResource) -> ClientResult<()> {
        // Soft-delete hands the Kubernetes removal to the reconciler; the
        // synced-state row goes away with it so a recreated global starts
        // from a clean slate.
        self.api
            .soft_delete_resource_by_key(&global.namespace, &global.kind, &global.name)
            .await?;
        self.api.delete_synced_state(global.id).await?;

        info!(global_resource_id = %global.id, "deleted global resource cleaned up");
        Ok(())
    }
}

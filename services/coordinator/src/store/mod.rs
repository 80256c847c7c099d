//! Storage layer for the coordinator.
//!
//! # Purpose
//! Defines the store traits the HTTP handlers program against, with two
//! backends: Postgres (durable, production) and in-memory (tests and local
//! development). The traits double as the resource/global-resource manager
//! surface: every operation is transactional inside the backend, and the
//! generation invariant is owned here, by a database trigger in Postgres and
//! by equivalent update-time logic in the memory backend.
//!
//! # Concurrency discipline
//! Multi-row updates run inside a transaction with a `SELECT ... FOR UPDATE`
//! on the single-owner row (applied/current/synced state), so concurrent
//! writers for the same resource serialize instead of interleaving.
use crate::model::{
    AppliedStateUpdate, ClusterApiKey, CurrentStateUpdate, GlobalResource, GlobalResourceKey,
    GlobalResourceSyncStatus, NewGlobalResource, NewResource, Resource, ResourceKey,
    ResourceWithState,
};
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

pub mod memory;
pub mod postgres;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Cluster registry and credential lookup.
#[async_trait]
pub trait ClusterStore: Send + Sync {
    /// Idempotent registration: inserting an already-known id is a no-op.
    async fn register_cluster(&self, cluster_id: &str) -> StoreResult<()>;

    async fn count_clusters(&self) -> StoreResult<i64>;

    /// Non-deleted keys for one cluster, for auth verification.
    async fn list_api_keys(&self, cluster_id: &str) -> StoreResult<Vec<ClusterApiKey>>;

    async fn create_api_key(
        &self,
        cluster_id: &str,
        name: &str,
        key_hash: &str,
    ) -> StoreResult<ClusterApiKey>;
}

/// Resource manager surface: transactional CRUD plus the worker-facing
/// out-of-sync/deleted queues and state upserts.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn create_resource(&self, new: NewResource) -> StoreResult<Resource>;

    async fn get_resource(&self, id: Uuid) -> StoreResult<ResourceWithState>;

    async fn get_resource_by_key(&self, key: &ResourceKey) -> StoreResult<ResourceWithState>;

    /// Non-deleted resources, optionally restricted to one cluster.
    async fn list_resources(&self, cluster_id: Option<&str>)
        -> StoreResult<Vec<ResourceWithState>>;

    /// Updates `desired_spec` and optionally `revision` (absent means
    /// revision + 1). Touches nothing else, so the generation invariant
    /// observes exactly the fields that matter.
    async fn update_resource(
        &self,
        id: Uuid,
        desired_spec: serde_json::Value,
        revision: Option<i32>,
    ) -> StoreResult<ResourceWithState>;

    async fn soft_delete_resource(&self, id: Uuid) -> StoreResult<()>;

    /// Soft-deletes within the caller's cluster; deleting an absent key is a
    /// no-op so the call is safe to retry.
    async fn soft_delete_resource_by_key(&self, key: &ResourceKey) -> StoreResult<()>;

    /// Create-or-update keyed on `(cluster_id, namespace, kind, name)` among
    /// non-deleted rows. One conditional statement, so concurrent creators of
    /// the same key never produce duplicates.
    async fn upsert_resource(&self, new: NewResource) -> StoreResult<Resource>;

    /// Resources whose applied generation trails (or lacks) the resource
    /// generation, oldest first.
    async fn list_out_of_sync_resources(
        &self,
        cluster_id: &str,
        limit: i64,
    ) -> StoreResult<Vec<Resource>>;

    /// Soft-deleted resources awaiting Kubernetes removal, oldest delete
    /// first.
    async fn list_deleted_resources(
        &self,
        cluster_id: &str,
        limit: i64,
    ) -> StoreResult<Vec<Resource>>;

    /// Permanently removes a resource and (by cascade) its state rows. The
    /// row must belong to `cluster_id`; foreign rows answer `NotFound`.
    async fn hard_delete_resource(&self, id: Uuid, cluster_id: &str) -> StoreResult<()>;

    /// Owning cluster of a resource, soft-deleted rows included. Handlers use
    /// this to reject state writes for foreign resources before touching any
    /// state row.
    async fn get_resource_cluster(&self, id: Uuid) -> StoreResult<String>;

    async fn upsert_applied_state(
        &self,
        resource_id: Uuid,
        update: AppliedStateUpdate,
    ) -> StoreResult<()>;

    /// No-op when the stored `k8s_resource_version` equals the incoming one.
    async fn upsert_current_state(
        &self,
        resource_id: Uuid,
        update: CurrentStateUpdate,
    ) -> StoreResult<()>;

    async fn delete_current_state(&self, resource_id: Uuid) -> StoreResult<()>;
}

/// Global-resource manager surface.
#[async_trait]
pub trait GlobalResourceStore: Send + Sync {
    async fn create_global_resource(&self, new: NewGlobalResource) -> StoreResult<GlobalResource>;

    async fn get_global_resource(&self, id: Uuid) -> StoreResult<GlobalResourceSyncStatus>;

    async fn get_global_resource_by_key(
        &self,
        key: &GlobalResourceKey,
    ) -> StoreResult<GlobalResourceSyncStatus>;

    async fn list_global_resources(&self) -> StoreResult<Vec<GlobalResourceSyncStatus>>;

    async fn update_global_resource(
        &self,
        id: Uuid,
        desired_spec: serde_json::Value,
        revision: Option<i32>,
    ) -> StoreResult<GlobalResourceSyncStatus>;

    async fn soft_delete_global_resource(&self, id: Uuid) -> StoreResult<()>;

    async fn upsert_global_resource(&self, new: NewGlobalResource) -> StoreResult<GlobalResource>;

    /// Global resources this cluster has never synced or is behind on,
    /// oldest first.
    async fn list_out_of_sync_global_resources(
        &self,
        cluster_id: &str,
        limit: i64,
    ) -> StoreResult<Vec<GlobalResource>>;

    async fn list_deleted_global_resources(&self, limit: i64) -> StoreResult<Vec<GlobalResource>>;

    async fn upsert_synced_state(
        &self,
        global_resource_id: Uuid,
        cluster_id: &str,
        synced_generation: i32,
    ) -> StoreResult<()>;

    async fn delete_synced_state(
        &self,
        global_resource_id: Uuid,
        cluster_id: &str,
    ) -> StoreResult<()>;
}

/// Everything the coordinator needs from a backend.
#[async_trait]
pub trait CoordinatorStore: ClusterStore + ResourceStore + GlobalResourceStore {
    async fn health_check(&self) -> StoreResult<()>;
    fn backend_name(&self) -> &'static str;
}

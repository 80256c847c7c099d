//! Cross-cluster resource models.
//!
//! A `GlobalResource` is cluster-agnostic desired state; each worker's global
//! syncer materializes it into a per-cluster `Resource` and records the
//! generation it reached in a `GlobalResourceSyncedState` row.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

/// Unique identity of a live global resource.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq, Eq, Hash)]
pub struct GlobalResourceKey {
    pub namespace: String,
    pub kind: String,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct GlobalResource {
    pub id: Uuid,
    pub namespace: String,
    pub kind: String,
    pub name: String,
    pub api_version: String,
    #[schema(value_type = Object)]
    pub desired_spec: Value,
    pub generation: i32,
    pub revision: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Insert payload for a global resource.
#[derive(Debug, Clone)]
pub struct NewGlobalResource {
    pub namespace: String,
    pub kind: String,
    pub name: String,
    pub api_version: String,
    pub desired_spec: Value,
    pub revision: i32,
}

/// Per-cluster record of the generation last materialized for a global
/// resource. Unique per `(global_resource_id, cluster_id)`.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct GlobalResourceSyncedState {
    pub id: Uuid,
    pub global_resource_id: Uuid,
    pub cluster_id: String,
    pub synced_generation: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// How far one cluster has caught up with a global resource.
/// `is_synced` is strict equality with the global's current generation.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct ClusterSyncStatus {
    pub cluster_id: String,
    pub synced_generation: i32,
    pub is_synced: bool,
}

/// A global resource with its fleet-wide sync summary.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct GlobalResourceSyncStatus {
    pub global_resource: GlobalResource,
    pub total_clusters: i64,
    pub synced_clusters: i64,
    pub clusters: Vec<ClusterSyncStatus>,
}

impl GlobalResource {
    pub fn key(&self) -> GlobalResourceKey {
        GlobalResourceKey {
            namespace: self.namespace.clone(),
            kind: self.kind.clone(),
            name: self.name.clone(),
        }
    }
}

//! Cluster-scoped resource models and state rows.
//!
//! # Purpose
//! Defines the declarative `Resource` record, the reconciler-owned applied
//! state, the watcher-owned current state, and the write payloads the store
//! accepts for each.
//!
//! # Key invariants
//! - `generation` starts at 1 on insert and moves only when `desired_spec`,
//!   `revision`, or `deleted_at` changes (database trigger; replicated in the
//!   in-memory backend).
//! - At most one applied row and one current row exist per resource.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

/// Unique identity of a live resource within the control plane.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq, Eq, Hash)]
pub struct ResourceKey {
    pub cluster_id: String,
    pub namespace: String,
    pub kind: String,
    pub name: String,
}

/// Declarative record of a single Kubernetes object in one cluster.
///
/// `desired_spec` is an opaque JSON object holding the Kubernetes body; the
/// coordinator never interprets it beyond storage and fan-out.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct Resource {
    pub id: Uuid,
    pub cluster_id: String,
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

/// Insert payload for a resource. `generation` is fixed at 1 by the store.
#[derive(Debug, Clone)]
pub struct NewResource {
    pub cluster_id: String,
    pub namespace: String,
    pub kind: String,
    pub name: String,
    pub api_version: String,
    pub desired_spec: Value,
    pub revision: i32,
}

/// Outcome of the most recent apply attempt.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AppliedStatus {
    Pending,
    Success,
    Error,
}

impl AppliedStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AppliedStatus::Pending => "pending",
            AppliedStatus::Success => "success",
            AppliedStatus::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<AppliedStatus> {
        match value {
            "pending" => Some(AppliedStatus::Pending),
            "success" => Some(AppliedStatus::Success),
            "error" => Some(AppliedStatus::Error),
            _ => None,
        }
    }
}

/// The reconciler's record of the last apply attempt for a resource.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct ResourceAppliedState {
    pub id: Uuid,
    pub resource_id: Uuid,
    #[schema(value_type = Option<Object>)]
    pub spec: Option<Value>,
    pub generation: i32,
    pub revision: i32,
    pub status: AppliedStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// The watcher's record of the last live observation of the object.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct ResourceCurrentState {
    pub id: Uuid,
    pub resource_id: Uuid,
    #[schema(value_type = Option<Object>)]
    pub spec: Option<Value>,
    pub generation: i32,
    pub revision: i32,
    pub k8s_resource_version: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Write payload for the applied row.
///
/// Error reports leave `generation`/`revision` unset so a failed apply never
/// advances the applied generation and the resource stays out of sync.
#[derive(Debug, Clone)]
pub struct AppliedStateUpdate {
    pub spec: Option<Value>,
    pub generation: Option<i32>,
    pub revision: Option<i32>,
    pub status: AppliedStatus,
    pub error_message: Option<String>,
}

/// Write payload for the current row.
#[derive(Debug, Clone)]
pub struct CurrentStateUpdate {
    pub spec: Option<Value>,
    pub generation: i32,
    pub revision: i32,
    pub k8s_resource_version: String,
}

/// A resource joined with whatever state rows exist for it.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct ResourceWithState {
    pub resource: Resource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied_state: Option<ResourceAppliedState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_state: Option<ResourceCurrentState>,
}

impl Resource {
    pub fn key(&self) -> ResourceKey {
        ResourceKey {
            cluster_id: self.cluster_id.clone(),
            namespace: self.namespace.clone(),
            kind: self.kind.clone(),
            name: self.name.clone(),
        }
    }
}

//! Wire types for the internal worker API.
//!
//! These mirror the coordinator's JSON shapes. The client keeps its own
//! copies so workers never link against the server crate.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A cluster-scoped declarative resource as served by the coordinator.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Resource {
    pub id: Uuid,
    pub cluster_id: String,
    pub namespace: String,
    pub kind: String,
    pub name: String,
    pub api_version: String,
    pub desired_spec: Value,
    pub generation: i32,
    pub revision: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// A global resource pending materialization in this cluster.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GlobalResource {
    pub id: Uuid,
    pub namespace: String,
    pub kind: String,
    pub name: String,
    pub api_version: String,
    pub desired_spec: Value,
    pub generation: i32,
    pub revision: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AppliedStatus {
    Pending,
    Success,
    Error,
}

/// Body for `POST /resources/:id/applied-state`.
///
/// Error reports leave `generation`/`revision` unset so the coordinator keeps
/// the previous values and the resource stays out of sync.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UpsertAppliedStateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spec: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<i32>,
    pub status: AppliedStatus,
    pub error_message: Option<String>,
}

/// Body for `POST /resources/:id/current-state`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UpsertCurrentStateRequest {
    pub spec: Option<Value>,
    pub generation: i32,
    pub revision: i32,
    pub k8s_resource_version: String,
}

/// Body for `POST /resources`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CreateResourceRequest {
    pub namespace: String,
    pub kind: String,
    pub name: String,
    pub api_version: String,
    pub desired_spec: Value,
    pub revision: i32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub(crate) struct SoftDeleteResourceByKeyRequest {
    pub namespace: String,
    pub kind: String,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub(crate) struct UpsertSyncedStateRequest {
    pub synced_generation: i32,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DataResponse<T> {
    pub data: T,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SuccessResponse {
    #[allow(dead_code)]
    pub success: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub error: String,
}

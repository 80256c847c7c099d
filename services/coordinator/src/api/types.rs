//! Wire types for the internal worker API.
use crate::model::{AppliedStatus, GlobalResource, Resource, ResourceWithState};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct HealthStatus {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct CreateResourceRequest {
    pub namespace: String,
    pub kind: String,
    pub name: String,
    pub api_version: String,
    #[schema(value_type = Object)]
    pub desired_spec: Value,
    #[serde(default)]
    pub revision: Option<i32>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct UpdateResourceRequest {
    #[schema(value_type = Object)]
    pub desired_spec: Value,
    #[serde(default)]
    pub revision: Option<i32>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct SoftDeleteResourceByKeyRequest {
    pub namespace: String,
    pub kind: String,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct UpsertAppliedStateRequest {
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub spec: Option<Value>,
    #[serde(default)]
    pub generation: Option<i32>,
    #[serde(default)]
    pub revision: Option<i32>,
    pub status: AppliedStatus,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct UpsertCurrentStateRequest {
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub spec: Option<Value>,
    pub generation: i32,
    pub revision: i32,
    pub k8s_resource_version: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct UpsertSyncedStateRequest {
    pub synced_generation: i32,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct ResourceResponse {
    pub data: Resource,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct ResourceListResponse {
    pub data: Vec<Resource>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct ResourceWithStateResponse {
    pub data: ResourceWithState,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct ResourceWithStateListResponse {
    pub data: Vec<ResourceWithState>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct GlobalResourceListResponse {
    pub data: Vec<GlobalResource>,
}

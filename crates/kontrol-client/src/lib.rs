//! Typed client for the kontrol internal worker API.
//!
//! # Purpose
//! Wraps the coordinator's `/int/api/v1` surface in typed methods for the
//! worker loops. Every request carries the worker's API key and cluster id
//! headers and is bounded by a 30 second timeout; non-2xx responses are
//! decoded into [`ClientError::Api`].
pub mod templates;
pub mod types;

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use types::{
    CreateResourceRequest, DataResponse, ErrorBody, GlobalResource, Resource,
    SoftDeleteResourceByKeyRequest, SuccessResponse, UpsertAppliedStateRequest,
    UpsertCurrentStateRequest, UpsertSyncedStateRequest,
};
use uuid::Uuid;

const API_KEY_HEADER: &str = "X-API-Key";
const CLUSTER_ID_HEADER: &str = "X-Cluster-ID";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("api error ({status}): {message}")]
    Api { status: StatusCode, message: String },
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
}

pub type ClientResult<T> = Result<T, ClientError>;

/// Client for one worker identity against one coordinator.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    api_key: String,
    cluster_id: String,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: &str, api_key: &str, cluster_id: &str) -> ClientResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            cluster_id: cluster_id.to_string(),
            http,
        })
    }

    pub fn cluster_id(&self) -> &str {
        &self.cluster_id
    }

    async fn request<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> ClientResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self
            .http
            .request(method, url)
            .header(API_KEY_HEADER, &self.api_key)
            .header(CLUSTER_ID_HEADER, &self.cluster_id);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            // Error bodies are {"error": "..."}; fall back to the raw text if
            // the body is not JSON (e.g. a proxy in the way).
            let message = match response.text().await {
                Ok(text) => serde_json::from_str::<ErrorBody>(&text)
                    .map(|b| b.error)
                    .unwrap_or(text),
                Err(_) => String::new(),
            };
            return Err(ClientError::Api { status, message });
        }
        Ok(response.json().await?)
    }

    const NO_BODY: Option<&'static ()> = None;

    /// Idempotent cluster self-registration, called once at worker boot.
    pub async fn register_cluster(&self) -> ClientResult<()> {
        self.request::<(), SuccessResponse>(Method::POST, "/int/api/v1/cluster/register", Self::NO_BODY)
            .await?;
        Ok(())
    }

    /// Resources awaiting reconciliation, oldest first.
    pub async fn list_out_of_sync_resources(&self, limit: i64) -> ClientResult<Vec<Resource>> {
        let path = format!("/int/api/v1/resources/out-of-sync?limit={limit}");
        let response: DataResponse<Vec<Resource>> =
            self.request(Method::GET, &path, Self::NO_BODY).await?;
        Ok(response.data)
    }

    /// Soft-deleted resources awaiting removal from Kubernetes.
    pub async fn list_deleted_resources(&self, limit: i64) -> ClientResult<Vec<Resource>> {
        let path = format!("/int/api/v1/resources/deleted?limit={limit}");
        let response: DataResponse<Vec<Resource>> =
            self.request(Method::GET, &path, Self::NO_BODY).await?;
        Ok(response.data)
    }

    pub async fn upsert_applied_state(
        &self,
        resource_id: Uuid,
        request: &UpsertAppliedStateRequest,
    ) -> ClientResult<()> {
        let path = format!("/int/api/v1/resources/{resource_id}/applied-state");
        self.request::<_, SuccessResponse>(Method::POST, &path, Some(request))
            .await?;
        Ok(())
    }

    /// Permanently remove a resource after its Kubernetes object is gone.
    pub async fn hard_delete_resource(&self, resource_id: Uuid) -> ClientResult<()> {
        let path = format!("/int/api/v1/resources/{resource_id}");
        self.request::<(), SuccessResponse>(Method::DELETE, &path, Self::NO_BODY)
            .await?;
        Ok(())
    }

    pub async fn upsert_current_state(
        &self,
        resource_id: Uuid,
        request: &UpsertCurrentStateRequest,
    ) -> ClientResult<()> {
        let path = format!("/int/api/v1/resources/{resource_id}/current-state");
        self.request::<_, SuccessResponse>(Method::POST, &path, Some(request))
            .await?;
        Ok(())
    }

    pub async fn delete_current_state(&self, resource_id: Uuid) -> ClientResult<()> {
        let path = format!("/int/api/v1/resources/{resource_id}/current-state");
        self.request::<(), SuccessResponse>(Method::DELETE, &path, Self::NO_BODY)
            .await?;
        Ok(())
    }

    /// Create-or-update a resource owned by this worker's cluster.
    pub async fn create_resource(&self, request: &CreateResourceRequest) -> ClientResult<Resource> {
        let response: DataResponse<Resource> = self
            .request(Method::POST, "/int/api/v1/resources", Some(request))
            .await?;
        Ok(response.data)
    }

    /// Soft-delete by `(namespace, kind, name)` within this worker's cluster.
    pub async fn soft_delete_resource_by_key(
        &self,
        namespace: &str,
        kind: &str,
        name: &str,
    ) -> ClientResult<()> {
        let request = SoftDeleteResourceByKeyRequest {
            namespace: namespace.to_string(),
            kind: kind.to_string(),
            name: name.to_string(),
        };
        self.request::<_, SuccessResponse>(Method::DELETE, "/int/api/v1/resources/by-key", Some(&request))
            .await?;
        Ok(())
    }

    /// Global resources this cluster has not materialized at their current
    /// generation yet.
    pub async fn list_out_of_sync_global_resources(
        &self,
        limit: i64,
    ) -> ClientResult<Vec<GlobalResource>> {
        let path = format!("/int/api/v1/global-resources/out-of-sync?limit={limit}");
        let response: DataResponse<Vec<GlobalResource>> =
            self.request(Method::GET, &path, Self::NO_BODY).await?;
        Ok(response.data)
    }

    pub async fn list_deleted_global_resources(
        &self,
        limit: i64,
    ) -> ClientResult<Vec<GlobalResource>> {
        let path = format!("/int/api/v1/global-resources/deleted?limit={limit}");
        let response: DataResponse<Vec<GlobalResource>> =
            self.request(Method::GET, &path, Self::NO_BODY).await?;
        Ok(response.data)
    }

    pub async fn upsert_synced_state(
        &self,
        global_resource_id: Uuid,
        synced_generation: i32,
    ) -> ClientResult<()> {
        let path = format!("/int/api/v1/global-resources/{global_resource_id}/synced-state");
        let request = UpsertSyncedStateRequest { synced_generation };
        self.request::<_, SuccessResponse>(Method::POST, &path, Some(&request))
            .await?;
        Ok(())
    }

    pub async fn delete_synced_state(&self, global_resource_id: Uuid) -> ClientResult<()> {
        let path = format!("/int/api/v1/global-resources/{global_resource_id}/synced-state");
        self.request::<(), SuccessResponse>(Method::DELETE, &path, Self::NO_BODY)
            .await?;
        Ok(())
    }
}

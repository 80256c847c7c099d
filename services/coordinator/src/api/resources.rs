//! Resource handlers: declarative CRUD plus the reconciler's queues.
use crate::api::error::{api_internal, api_not_found, ApiError, ApiJson};
use crate::api::types::{
    CreateResourceRequest, ResourceListResponse, ResourceResponse, ResourceWithStateListResponse,
    ResourceWithStateResponse, SoftDeleteResourceByKeyRequest, SuccessResponse,
    UpdateResourceRequest,
};
use crate::api::{parse_id, parse_limit};
use crate::app::AppState;
use crate::auth::ClusterIdentity;
use crate::model::{NewResource, ResourceKey};
use crate::store::StoreError;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use std::collections::HashMap;

/// Create-or-update a resource owned by the caller's cluster, keyed by
/// `(namespace, kind, name)`. A global-syncer replay or a racing creator
/// lands on the same row instead of duplicating it.
#[utoipa::path(
    post,
    path = "/int/api/v1/resources",
    tag = "resources",
    request_body = CreateResourceRequest,
    responses(
        (status = 201, description = "Resource created or updated", body = ResourceResponse),
        (status = 400, description = "Malformed body", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn create_resource(
    State(state): State<AppState>,
    Extension(ClusterIdentity(cluster_id)): Extension<ClusterIdentity>,
    ApiJson(req): ApiJson<CreateResourceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let resource = state
        .store
        .upsert_resource(NewResource {
            cluster_id,
            namespace: req.namespace,
            kind: req.kind,
            name: req.name,
            api_version: req.api_version,
            desired_spec: req.desired_spec,
            revision: req.revision.unwrap_or(1),
        })
        .await
        .map_err(|err| api_internal("failed to create resource", &err))?;
    Ok((StatusCode::CREATED, Json(ResourceResponse { data: resource })))
}

#[utoipa::path(
    get,
    path = "/int/api/v1/resources",
    tag = "resources",
    responses(
        (status = 200, description = "Resources with states", body = ResourceWithStateListResponse)
    )
)]
pub(crate) async fn list_resources(
    State(state): State<AppState>,
    Extension(ClusterIdentity(cluster_id)): Extension<ClusterIdentity>,
) -> Result<Json<ResourceWithStateListResponse>, ApiError> {
    let data = state
        .store
        .list_resources(Some(&cluster_id))
        .await
        .map_err(|err| api_internal("failed to list resources", &err))?;
    Ok(Json(ResourceWithStateListResponse { data }))
}

#[utoipa::path(
    get,
    path = "/int/api/v1/resources/{id}",
    tag = "resources",
    params(("id" = String, Path, description = "Resource id")),
    responses(
        (status = 200, description = "Resource with states", body = ResourceWithStateResponse),
        (status = 404, description = "Unknown or foreign resource", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn get_resource(
    State(state): State<AppState>,
    Extension(ClusterIdentity(cluster_id)): Extension<ClusterIdentity>,
    Path(id): Path<String>,
) -> Result<Json<ResourceWithStateResponse>, ApiError> {
    let id = parse_id(&id, "resource")?;
    let data = match state.store.get_resource(id).await {
        Ok(data) => data,
        Err(StoreError::NotFound(_)) => return Err(api_not_found("resource not found")),
        Err(err) => return Err(api_internal("failed to get resource", &err)),
    };
    // Foreign resources look exactly like missing ones.
    if data.resource.cluster_id != cluster_id {
        return Err(api_not_found("resource not found"));
    }
    Ok(Json(ResourceWithStateResponse { data }))
}

#[utoipa::path(
    put,
    path = "/int/api/v1/resources/{id}",
    tag = "resources",
    params(("id" = String, Path, description = "Resource id")),
    request_body = UpdateResourceRequest,
    responses(
        (status = 200, description = "Updated resource", body = ResourceWithStateResponse),
        (status = 404, description = "Unknown or foreign resource", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn update_resource(
    State(state): State<AppState>,
    Extension(ClusterIdentity(cluster_id)): Extension<ClusterIdentity>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdateResourceRequest>,
) -> Result<Json<ResourceWithStateResponse>, ApiError> {
    let id = parse_id(&id, "resource")?;
    match state.store.get_resource_cluster(id).await {
        Ok(owner) if owner == cluster_id => {}
        Ok(_) | Err(StoreError::NotFound(_)) => return Err(api_not_found("resource not found")),
        Err(err) => return Err(api_internal("failed to get resource", &err)),
    }
    let data = match state
        .store
        .update_resource(id, req.desired_spec, req.revision)
        .await
    {
        Ok(data) => data,
        Err(StoreError::NotFound(_)) => return Err(api_not_found("resource not found")),
        Err(err) => return Err(api_internal("failed to update resource", &err)),
    };
    Ok(Json(ResourceWithStateResponse { data }))
}

/// Resources whose applied generation trails the desired generation, oldest
/// first, capped by `limit`. This is the reconciler's work queue.
#[utoipa::path(
    get,
    path = "/int/api/v1/resources/out-of-sync",
    tag = "resources",
    params(("limit" = Option<i64>, Query, description = "Batch size, 1-500")),
    responses(
        (status = 200, description = "Out-of-sync resources", body = ResourceListResponse)
    )
)]
pub(crate) async fn list_out_of_sync_resources(
    State(state): State<AppState>,
    Extension(ClusterIdentity(cluster_id)): Extension<ClusterIdentity>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<ResourceListResponse>, ApiError> {
    let limit = parse_limit(&params);
    let data = state
        .store
        .list_out_of_sync_resources(&cluster_id, limit)
        .await
        .map_err(|err| api_internal("failed to list resources", &err))?;
    Ok(Json(ResourceListResponse { data }))
}

/// Soft-deleted resources awaiting removal from the cluster.
#[utoipa::path(
    get,
    path = "/int/api/v1/resources/deleted",
    tag = "resources",
    params(("limit" = Option<i64>, Query, description = "Batch size, 1-500")),
    responses(
        (status = 200, description = "Soft-deleted resources", body = ResourceListResponse)
    )
)]
pub(crate) async fn list_deleted_resources(
    State(state): State<AppState>,
    Extension(ClusterIdentity(cluster_id)): Extension<ClusterIdentity>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<ResourceListResponse>, ApiError> {
    let limit = parse_limit(&params);
    let data = state
        .store
        .list_deleted_resources(&cluster_id, limit)
        .await
        .map_err(|err| api_internal("failed to list deleted resources", &err))?;
    Ok(Json(ResourceListResponse { data }))
}

/// Soft-delete by unique key within the caller's cluster. Deleting a key
/// that is already gone still succeeds, so retries are harmless.
#[utoipa::path(
    delete,
    path = "/int/api/v1/resources/by-key",
    tag = "resources",
    request_body = SoftDeleteResourceByKeyRequest,
    responses(
        (status = 200, description = "Resource soft-deleted", body = SuccessResponse)
    )
)]
pub(crate) async fn soft_delete_resource_by_key(
    State(state): State<AppState>,
    Extension(ClusterIdentity(cluster_id)): Extension<ClusterIdentity>,
    ApiJson(req): ApiJson<SoftDeleteResourceByKeyRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state
        .store
        .soft_delete_resource_by_key(&ResourceKey {
            cluster_id,
            namespace: req.namespace,
            kind: req.kind,
            name: req.name,
        })
        .await
        .map_err(|err| api_internal("failed to delete resource", &err))?;
    Ok(Json(SuccessResponse::ok()))
}

/// Hard-delete after the reconciler removed the object from Kubernetes.
/// Cascades the applied and current state rows.
#[utoipa::path(
    delete,
    path = "/int/api/v1/resources/{id}",
    tag = "resources",
    params(("id" = String, Path, description = "Resource id")),
    responses(
        (status = 200, description = "Resource removed", body = SuccessResponse),
        (status = 404, description = "Unknown or foreign resource", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn hard_delete_resource(
    State(state): State<AppState>,
    Extension(ClusterIdentity(cluster_id)): Extension<ClusterIdentity>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let id = parse_id(&id, "resource")?;
    match state.store.hard_delete_resource(id, &cluster_id).await {
        Ok(()) => Ok(Json(SuccessResponse::ok())),
        Err(StoreError::NotFound(_)) => Err(api_not_found("resource not found")),
        Err(err) => Err(api_internal("failed to delete resource", &err)),
    }
}

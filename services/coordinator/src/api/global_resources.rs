//! Global-resource handlers for the worker's global syncer.
use crate::api::error::{api_internal, ApiError, ApiJson};
use crate::api::types::{GlobalResourceListResponse, SuccessResponse, UpsertSyncedStateRequest};
use crate::api::{parse_id, parse_limit};
use crate::app::AppState;
use crate::auth::ClusterIdentity;
use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use std::collections::HashMap;

/// Global resources the calling cluster has never materialized or is behind
/// on, oldest first.
#[utoipa::path(
    get,
    path = "/int/api/v1/global-resources/out-of-sync",
    tag = "global-resources",
    params(("limit" = Option<i64>, Query, description = "Batch size, 1-500")),
    responses(
        (status = 200, description = "Out-of-sync global resources", body = GlobalResourceListResponse)
    )
)]
pub(crate) async fn list_out_of_sync_global_resources(
    State(state): State<AppState>,
    Extension(ClusterIdentity(cluster_id)): Extension<ClusterIdentity>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<GlobalResourceListResponse>, ApiError> {
    let limit = parse_limit(&params);
    let data = state
        .store
        .list_out_of_sync_global_resources(&cluster_id, limit)
        .await
        .map_err(|err| api_internal("failed to list global resources", &err))?;
    Ok(Json(GlobalResourceListResponse { data }))
}

#[utoipa::path(
    get,
    path = "/int/api/v1/global-resources/deleted",
    tag = "global-resources",
    params(("limit" = Option<i64>, Query, description = "Batch size, 1-500")),
    responses(
        (status = 200, description = "Soft-deleted global resources", body = GlobalResourceListResponse)
    )
)]
pub(crate) async fn list_deleted_global_resources(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<GlobalResourceListResponse>, ApiError> {
    let limit = parse_limit(&params);
    let data = state
        .store
        .list_deleted_global_resources(limit)
        .await
        .map_err(|err| api_internal("failed to list deleted global resources", &err))?;
    Ok(Json(GlobalResourceListResponse { data }))
}

/// Record the generation the caller just materialized for a global resource.
#[utoipa::path(
    post,
    path = "/int/api/v1/global-resources/{id}/synced-state",
    tag = "global-resources",
    params(("id" = String, Path, description = "Global resource id")),
    request_body = UpsertSyncedStateRequest,
    responses(
        (status = 200, description = "Synced state recorded", body = SuccessResponse)
    )
)]
pub(crate) async fn upsert_synced_state(
    State(state): State<AppState>,
    Extension(ClusterIdentity(cluster_id)): Extension<ClusterIdentity>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpsertSyncedStateRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let id = parse_id(&id, "global resource")?;
    state
        .store
        .upsert_synced_state(id, &cluster_id, req.synced_generation)
        .await
        .map_err(|err| api_internal("failed to upsert synced state", &err))?;
    Ok(Json(SuccessResponse::ok()))
}

/// Drop the caller's synced-state row for a deleted global resource.
#[utoipa::path(
    delete,
    path = "/int/api/v1/global-resources/{id}/synced-state",
    tag = "global-resources",
    params(("id" = String, Path, description = "Global resource id")),
    responses(
        (status = 200, description = "Synced state removed", body = SuccessResponse)
    )
)]
pub(crate) async fn delete_synced_state(
    State(state): State<AppState>,
    Extension(ClusterIdentity(cluster_id)): Extension<ClusterIdentity>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let id = parse_id(&id, "global resource")?;
    state
        .store
        .delete_synced_state(id, &cluster_id)
        .await
        .map_err(|err| api_internal("failed to delete synced state", &err))?;
    Ok(Json(SuccessResponse::ok()))
}

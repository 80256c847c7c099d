//! Applied/current state handlers.
//!
//! These are the write paths the reconciler and watcher hit on every pass.
//! Both upserts serialize per resource inside the store (row lock), and both
//! verify ownership against the middleware-attached cluster id before
//! touching a state row.
use crate::api::error::{api_internal, api_not_found, ApiError, ApiJson};
use crate::api::types::{SuccessResponse, UpsertAppliedStateRequest, UpsertCurrentStateRequest};
use crate::api::parse_id;
use crate::app::AppState;
use crate::auth::ClusterIdentity;
use crate::model::{AppliedStateUpdate, CurrentStateUpdate};
use crate::store::StoreError;
use axum::extract::{Path, State};
use axum::{Extension, Json};
use uuid::Uuid;

async fn ensure_owned(state: &AppState, id: Uuid, cluster_id: &str) -> Result<(), ApiError> {
    match state.store.get_resource_cluster(id).await {
        Ok(owner) if owner == cluster_id => Ok(()),
        Ok(_) | Err(StoreError::NotFound(_)) => Err(api_not_found("resource not found")),
        Err(err) => Err(api_internal("failed to get resource", &err)),
    }
}

/// Record the outcome of an apply attempt. Success advances the applied
/// generation; errors only record the message so the resource stays queued.
#[utoipa::path(
    post,
    path = "/int/api/v1/resources/{id}/applied-state",
    tag = "states",
    params(("id" = String, Path, description = "Resource id")),
    request_body = UpsertAppliedStateRequest,
    responses(
        (status = 200, description = "Applied state recorded", body = SuccessResponse),
        (status = 404, description = "Unknown or foreign resource", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn upsert_applied_state(
    State(state): State<AppState>,
    Extension(ClusterIdentity(cluster_id)): Extension<ClusterIdentity>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpsertAppliedStateRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let id = parse_id(&id, "resource")?;
    ensure_owned(&state, id, &cluster_id).await?;
    state
        .store
        .upsert_applied_state(
            id,
            AppliedStateUpdate {
                spec: req.spec,
                generation: req.generation,
                revision: req.revision,
                status: req.status,
                error_message: req.error_message,
            },
        )
        .await
        .map_err(|err| api_internal("failed to upsert applied state", &err))?;
    Ok(Json(SuccessResponse::ok()))
}

/// Record a live observation from the watcher. Writes are suppressed when the
/// observed `k8s_resource_version` matches the stored one.
#[utoipa::path(
    post,
    path = "/int/api/v1/resources/{id}/current-state",
    tag = "states",
    params(("id" = String, Path, description = "Resource id")),
    request_body = UpsertCurrentStateRequest,
    responses(
        (status = 200, description = "Current state recorded", body = SuccessResponse),
        (status = 404, description = "Unknown or foreign resource", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn upsert_current_state(
    State(state): State<AppState>,
    Extension(ClusterIdentity(cluster_id)): Extension<ClusterIdentity>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpsertCurrentStateRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let id = parse_id(&id, "resource")?;
    ensure_owned(&state, id, &cluster_id).await?;
    state
        .store
        .upsert_current_state(
            id,
            CurrentStateUpdate {
                spec: req.spec,
                generation: req.generation,
                revision: req.revision,
                k8s_resource_version: req.k8s_resource_version,
            },
        )
        .await
        .map_err(|err| api_internal("failed to upsert current state", &err))?;
    Ok(Json(SuccessResponse::ok()))
}

/// Drop the current-state row after the object disappeared from Kubernetes.
#[utoipa::path(
    delete,
    path = "/int/api/v1/resources/{id}/current-state",
    tag = "states",
    params(("id" = String, Path, description = "Resource id")),
    responses(
        (status = 200, description = "Current state removed", body = SuccessResponse)
    )
)]
pub(crate) async fn delete_current_state(
    State(state): State<AppState>,
    Extension(ClusterIdentity(cluster_id)): Extension<ClusterIdentity>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let id = parse_id(&id, "resource")?;
    // The resource row may already be hard-deleted by the time the watcher
    // sees the DELETED event; an unknown id just means nothing to clean up.
    match state.store.get_resource_cluster(id).await {
        Ok(owner) if owner != cluster_id => return Err(api_not_found("resource not found")),
        Ok(_) | Err(StoreError::NotFound(_)) => {}
        Err(err) => return Err(api_internal("failed to get resource", &err)),
    }
    state
        .store
        .delete_current_state(id)
        .await
        .map_err(|err| api_internal("failed to delete current state", &err))?;
    Ok(Json(SuccessResponse::ok()))
}

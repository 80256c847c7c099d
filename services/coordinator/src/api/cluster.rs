//! Cluster registration handler.
use crate::api::error::{api_internal, ApiError};
use crate::api::types::SuccessResponse;
use crate::app::AppState;
use crate::auth::ClusterIdentity;
use axum::extract::State;
use axum::{Extension, Json};

/// Idempotent self-registration: a worker calls this once at boot, and the
/// coordinator creates the cluster row if it does not exist yet.
#[utoipa::path(
    post,
    path = "/int/api/v1/cluster/register",
    tag = "cluster",
    responses(
        (status = 200, description = "Cluster registered", body = SuccessResponse),
        (status = 401, description = "Authentication failed", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn register_cluster(
    State(state): State<AppState>,
    Extension(ClusterIdentity(cluster_id)): Extension<ClusterIdentity>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state
        .store
        .register_cluster(&cluster_id)
        .await
        .map_err(|err| api_internal("failed to register cluster", &err))?;
    tracing::info!(cluster_id = %cluster_id, "cluster registered");
    Ok(Json(SuccessResponse::ok()))
}

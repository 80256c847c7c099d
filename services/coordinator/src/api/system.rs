//! Health endpoint.
use crate::api::error::{api_unavailable, ApiError};
use crate::api::types::HealthStatus;
use crate::app::AppState;
use axum::extract::State;
use axum::Json;

#[utoipa::path(
    get,
    path = "/health",
    tag = "system",
    responses(
        (status = 200, description = "Coordinator healthy", body = HealthStatus),
        (status = 503, description = "Store unavailable", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn health(State(state): State<AppState>) -> Result<Json<HealthStatus>, ApiError> {
    state
        .store
        .health_check()
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "health check failed");
            api_unavailable("store unavailable")
        })?;
    Ok(Json(HealthStatus {
        status: "healthy".to_string(),
    }))
}

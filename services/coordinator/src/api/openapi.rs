//! OpenAPI document for the internal worker API.
use crate::api;
use crate::model::{
    AppliedStatus, Cluster, ClusterSyncStatus, GlobalResource, GlobalResourceKey,
    GlobalResourceSyncStatus, GlobalResourceSyncedState, Resource, ResourceAppliedState,
    ResourceCurrentState, ResourceKey, ResourceWithState,
};
use axum::Json;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Kontrol internal worker API",
        description = "Endpoints workers use to pull desired state and report applied/current/synced state."
    ),
    paths(
        api::system::health,
        api::cluster::register_cluster,
        api::resources::create_resource,
        api::resources::list_resources,
        api::resources::get_resource,
        api::resources::update_resource,
        api::resources::list_out_of_sync_resources,
        api::resources::list_deleted_resources,
        api::resources::soft_delete_resource_by_key,
        api::resources::hard_delete_resource,
        api::states::upsert_applied_state,
        api::states::upsert_current_state,
        api::states::delete_current_state,
        api::global_resources::list_out_of_sync_global_resources,
        api::global_resources::list_deleted_global_resources,
        api::global_resources::upsert_synced_state,
        api::global_resources::delete_synced_state,
    ),
    components(schemas(
        Cluster,
        Resource,
        ResourceKey,
        ResourceAppliedState,
        ResourceCurrentState,
        ResourceWithState,
        AppliedStatus,
        GlobalResource,
        GlobalResourceKey,
        GlobalResourceSyncedState,
        GlobalResourceSyncStatus,
        ClusterSyncStatus,
        api::types::ErrorResponse,
        api::types::SuccessResponse,
        api::types::HealthStatus,
        api::types::CreateResourceRequest,
        api::types::UpdateResourceRequest,
        api::types::SoftDeleteResourceByKeyRequest,
        api::types::UpsertAppliedStateRequest,
        api::types::UpsertCurrentStateRequest,
        api::types::UpsertSyncedStateRequest,
        api::types::ResourceResponse,
        api::types::ResourceListResponse,
        api::types::ResourceWithStateResponse,
        api::types::ResourceWithStateListResponse,
        api::types::GlobalResourceListResponse,
    ))
)]
pub struct ApiDoc;

pub(crate) async fn serve() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

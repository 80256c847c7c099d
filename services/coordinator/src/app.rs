//! Coordinator HTTP application wiring.
//!
//! # Purpose
//! Builds the Axum router, mounts the worker API under `/int/api/v1` behind
//! the cluster auth middleware, and defines the shared application state.
use crate::api;
use crate::auth;
use crate::store::CoordinatorStore;
use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Upper bound for one request, store work included.
const REQUEST_DEADLINE: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CoordinatorStore>,
}

pub fn build_router(state: AppState) -> Router {
    let internal = Router::new()
        .route("/cluster/register", post(api::cluster::register_cluster))
        .route(
            "/resources",
            post(api::resources::create_resource).get(api::resources::list_resources),
        )
        .route(
            "/resources/out-of-sync",
            get(api::resources::list_out_of_sync_resources),
        )
        .route(
            "/resources/deleted",
            get(api::resources::list_deleted_resources),
        )
        .route(
            "/resources/by-key",
            delete(api::resources::soft_delete_resource_by_key),
        )
        .route(
            "/resources/:id",
            get(api::resources::get_resource)
                .put(api::resources::update_resource)
                .delete(api::resources::hard_delete_resource),
        )
        .route(
            "/resources/:id/applied-state",
            post(api::states::upsert_applied_state),
        )
        .route(
            "/resources/:id/current-state",
            post(api::states::upsert_current_state).delete(api::states::delete_current_state),
        )
        .route(
            "/global-resources/out-of-sync",
            get(api::global_resources::list_out_of_sync_global_resources),
        )
        .route(
            "/global-resources/deleted",
            get(api::global_resources::list_deleted_global_resources),
        )
        .route(
            "/global-resources/:id/synced-state",
            post(api::global_resources::upsert_synced_state)
                .delete(api::global_resources::delete_synced_state),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_cluster_auth,
        ));

    Router::new()
        .route("/health", get(api::system::health))
        .route("/api-docs/openapi.json", get(api::openapi::serve))
        .nest("/int/api/v1", internal)
        .layer(TimeoutLayer::new(REQUEST_DEADLINE))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http.request",
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        )
        .with_state(state)
}

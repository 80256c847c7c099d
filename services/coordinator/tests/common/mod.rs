//! Shared helpers for coordinator integration tests.
use axum::body::Body;
use axum::http::Request;
use axum::Router;
use coordinator::app::{build_router, AppState};
use coordinator::auth::KeyGenerator;
use coordinator::store::memory::InMemoryStore;
use coordinator::store::{ClusterStore, CoordinatorStore};
use std::sync::Arc;

/// Router + store with one provisioned API key per requested cluster.
/// Returns the raw keys by cluster in the same order as `clusters`.
pub async fn app_with_clusters(
    clusters: &[&str],
) -> (Router, Arc<dyn CoordinatorStore>, Vec<String>) {
    let store: Arc<dyn CoordinatorStore> = Arc::new(InMemoryStore::new());
    let generator = KeyGenerator::new();

    let mut raw_keys = Vec::with_capacity(clusters.len());
    for cluster in clusters {
        store.register_cluster(cluster).await.expect("register");
        let (raw, hash) = generator.generate().expect("generate key");
        store
            .create_api_key(cluster, "test", &hash)
            .await
            .expect("create key");
        raw_keys.push(raw);
    }

    let app = build_router(AppState {
        store: store.clone(),
    });
    (app, store, raw_keys)
}

/// Authenticated JSON request against the internal API.
pub fn auth_request(
    method: &str,
    uri: &str,
    cluster: &str,
    key: &str,
    body: Option<serde_json::Value>,
) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-api-key", key)
        .header("x-cluster-id", cluster)
        .header("content-type", "application/json");
    match body {
        Some(body) => builder.body(Body::from(body.to_string())).expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    }
}

pub async fn read_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

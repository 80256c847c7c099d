//! Cluster authentication middleware for the internal worker API.
//!
//! # Key invariants
//! - Both `X-API-Key` and `X-Cluster-ID` are required on every request.
//! - The presented key is tested against every non-deleted hash stored for
//!   the declared cluster; one match authenticates the request.
//! - The verified cluster id is attached as a request extension and is the
//!   only cluster scope handlers may use.
//!
//! # Security considerations
//! - Rejections stay generic ("invalid api key"): the response does not say
//!   whether the cluster id or the key was wrong.
use super::KeyGenerator;
use crate::api::error::{api_internal, api_unauthorized};
use crate::app::AppState;
use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

pub const API_KEY_HEADER: &str = "x-api-key";
pub const CLUSTER_ID_HEADER: &str = "x-cluster-id";

/// The authenticated caller's cluster id, attached by the middleware.
#[derive(Debug, Clone)]
pub struct ClusterIdentity(pub String);

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub async fn require_cluster_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(api_key) = header_value(request.headers(), API_KEY_HEADER) else {
        return api_unauthorized("missing api key").into_response();
    };
    let Some(cluster_id) = header_value(request.headers(), CLUSTER_ID_HEADER) else {
        return api_unauthorized("missing cluster id").into_response();
    };

    let keys = match state.store.list_api_keys(&cluster_id).await {
        Ok(keys) => keys,
        Err(err) => return api_internal("failed to load api keys", &err).into_response(),
    };

    let generator = KeyGenerator::new();
    for key in &keys {
        match generator.verify(&api_key, &key.key_hash) {
            Ok(true) => {
                request.extensions_mut().insert(ClusterIdentity(cluster_id));
                return next.run(request).await;
            }
            Ok(false) => {}
            Err(err) => {
                tracing::warn!(key_id = %key.id, error = %err, "skipping unverifiable key hash");
            }
        }
    }

    api_unauthorized("invalid api key").into_response()
}

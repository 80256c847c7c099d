//! Internal worker API handlers.
//!
//! # Purpose
//! Exposes the route handler modules plus the small helpers they share.
//! Cluster scope always comes from the auth middleware's request extension;
//! no handler reads a cluster id out of a body or query string.
pub mod cluster;
pub mod error;
pub mod global_resources;
pub mod openapi;
pub mod resources;
pub mod states;
pub mod system;
pub mod types;

use self::error::{api_bad_request, ApiError};
use std::collections::HashMap;
use uuid::Uuid;

pub(crate) const DEFAULT_LIST_LIMIT: i64 = 100;
pub(crate) const MAX_LIST_LIMIT: i64 = 500;

/// Parse the `limit` query parameter: default 100, clamped to [1, 500].
/// Garbage values fall back to the default rather than erroring, so a worker
/// with a bad config keeps draining its queues.
pub(crate) fn parse_limit(params: &HashMap<String, String>) -> i64 {
    let limit = params
        .get("limit")
        .and_then(|value| value.parse::<i64>().ok())
        .filter(|l| *l > 0)
        .unwrap_or(DEFAULT_LIST_LIMIT);
    limit.min(MAX_LIST_LIMIT)
}

/// Parse a path segment as a resource/global-resource id.
pub(crate) fn parse_id(raw: &str, what: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| api_bad_request(&format!("invalid {what} id")))
}

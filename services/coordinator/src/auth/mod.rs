//! Worker authentication.
//!
//! Workers authenticate with a pre-shared API key plus the cluster id they
//! claim to be. The middleware resolves the pair against stored key hashes
//! and stamps the verified cluster id onto the request; handlers trust only
//! that stamp, never a cluster id from a request body.
mod api_key;
mod middleware;

pub use api_key::KeyGenerator;
pub use middleware::{require_cluster_auth, ClusterIdentity};

//! Cluster registry models.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// A registered managed cluster. Created idempotently when a worker first
/// calls the register endpoint; the id is an opaque, operator-chosen string.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct Cluster {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A credential a worker presents for its cluster.
///
/// `key_hash` holds an Argon2id hash of the bearer token; the token itself is
/// never stored. Several live keys per cluster are allowed so keys can be
/// rotated without downtime.
#[derive(Debug, Serialize, Clone)]
pub struct ClusterApiKey {
    pub id: Uuid,
    pub cluster_id: String,
    #[serde(skip_serializing)]
    pub key_hash: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

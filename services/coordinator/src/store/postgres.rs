//! Postgres-backed implementation of the coordinator store.
//!
//! # What this module is
//! The durable backend for control-plane state: clusters and their API keys,
//! per-cluster resources with applied/current state, and global resources with
//! per-cluster synced state.
//!
//! # Consistency model
//! - Every multi-row mutation runs in a transaction.
//! - State upserts (`applied`, `current`, `synced`) take a `SELECT ... FOR
//!   UPDATE` on the single-owner row first, so concurrent posts for the same
//!   resource serialize at the row lock instead of interleaving.
//! - `generation` is never assigned by this module after insert. A `BEFORE
//!   UPDATE` trigger (`increment_resource_generation`, see migrations) bumps
//!   it when `desired_spec`, `revision`, or `deleted_at` changes.
//! - Upserts-by-key rely on partial unique indexes (`WHERE deleted_at IS
//!   NULL`) with `ON CONFLICT ... DO UPDATE`, so two concurrent creators of
//!   one key cannot duplicate it.
//!
//! # Operational notes
//! - The pool caps concurrent DB work (`max_connections`) and fails fast when
//!   the database is unhealthy (`acquire_timeout`).
//! - Migrations are embedded at compile time and run on startup only when the
//!   operator opts in (`KONTROL_AUTO_MIGRATE`).
use super::{
    ClusterStore, CoordinatorStore, GlobalResourceStore, ResourceStore, StoreError, StoreResult,
};
use crate::config::ApiConfig;
use crate::model::{
    AppliedStateUpdate, AppliedStatus, ClusterApiKey, ClusterSyncStatus, CurrentStateUpdate,
    GlobalResource, GlobalResourceKey, GlobalResourceSyncStatus, GlobalResourceSyncedState,
    NewGlobalResource, NewResource, Resource, ResourceAppliedState, ResourceCurrentState,
    ResourceKey, ResourceWithState,
};
use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{FromRow, PgPool};
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

pub struct PostgresStore {
    pool: PgPool,
}

/// Row shape for `k_resources`. Kept separate from the domain type so column
/// storage details stay localized here.
#[derive(Debug, Clone, FromRow)]
struct DbResource {
    id: Uuid,
    cluster_id: String,
    namespace: String,
    kind: String,
    name: String,
    api_version: String,
    desired_spec: Value,
    generation: i32,
    revision: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl From<DbResource> for Resource {
    fn from(row: DbResource) -> Self {
        Resource {
            id: row.id,
            cluster_id: row.cluster_id,
            namespace: row.namespace,
            kind: row.kind,
            name: row.name,
            api_version: row.api_version,
            desired_spec: row.desired_spec,
            generation: row.generation,
            revision: row.revision,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        }
    }
}

/// Row shape for `k_resource_applied_states`.
#[derive(Debug, Clone, FromRow)]
struct DbAppliedState {
    id: Uuid,
    resource_id: Uuid,
    spec: Option<Value>,
    generation: i32,
    revision: i32,
    status: String,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<DbAppliedState> for ResourceAppliedState {
    type Error = StoreError;

    fn try_from(row: DbAppliedState) -> Result<Self, StoreError> {
        let status = AppliedStatus::parse(&row.status)
            .ok_or_else(|| StoreError::Unexpected(anyhow!("unknown applied status {:?}", row.status)))?;
        Ok(ResourceAppliedState {
            id: row.id,
            resource_id: row.resource_id,
            spec: row.spec,
            generation: row.generation,
            revision: row.revision,
            status,
            error_message: row.error_message,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        })
    }
}

/// Row shape for `k_resource_current_states`.
#[derive(Debug, Clone, FromRow)]
struct DbCurrentState {
    id: Uuid,
    resource_id: Uuid,
    spec: Option<Value>,
    generation: i32,
    revision: i32,
    k8s_resource_version: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl From<DbCurrentState> for ResourceCurrentState {
    fn from(row: DbCurrentState) -> Self {
        ResourceCurrentState {
            id: row.id,
            resource_id: row.resource_id,
            spec: row.spec,
            generation: row.generation,
            revision: row.revision,
            k8s_resource_version: row.k8s_resource_version,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        }
    }
}

/// Row shape for `k_global_resources`.
#[derive(Debug, Clone, FromRow)]
struct DbGlobalResource {
    id: Uuid,
    namespace: String,
    kind: String,
    name: String,
    api_version: String,
    desired_spec: Value,
    generation: i32,
    revision: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl From<DbGlobalResource> for GlobalResource {
    fn from(row: DbGlobalResource) -> Self {
        GlobalResource {
            id: row.id,
            namespace: row.namespace,
            kind: row.kind,
            name: row.name,
            api_version: row.api_version,
            desired_spec: row.desired_spec,
            generation: row.generation,
            revision: row.revision,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        }
    }
}

/// Row shape for `k_global_resource_synced_states`.
#[derive(Debug, Clone, FromRow)]
struct DbSyncedState {
    id: Uuid,
    global_resource_id: Uuid,
    cluster_id: String,
    synced_generation: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl From<DbSyncedState> for GlobalResourceSyncedState {
    fn from(row: DbSyncedState) -> Self {
        GlobalResourceSyncedState {
            id: row.id,
            global_resource_id: row.global_resource_id,
            cluster_id: row.cluster_id,
            synced_generation: row.synced_generation,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        }
    }
}

/// Row shape for `k_cluster_api_keys`.
#[derive(Debug, Clone, FromRow)]
struct DbApiKey {
    id: Uuid,
    cluster_id: String,
    key_hash: String,
    name: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl From<DbApiKey> for ClusterApiKey {
    fn from(row: DbApiKey) -> Self {
        ClusterApiKey {
            id: row.id,
            cluster_id: row.cluster_id,
            key_hash: row.key_hash,
            name: row.name,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        }
    }
}

fn db_err(err: sqlx::Error) -> StoreError {
    StoreError::Unexpected(err.into())
}

fn conflict_or_db_err(err: sqlx::Error, what: &str) -> StoreError {
    if let sqlx::Error::Database(ref db) = err {
        if db.is_unique_violation() {
            return StoreError::Conflict(what.to_string());
        }
    }
    db_err(err)
}

const RESOURCE_COLUMNS: &str = "id, cluster_id, namespace, kind, name, api_version, desired_spec, \
     generation, revision, created_at, updated_at, deleted_at";

const GLOBAL_RESOURCE_COLUMNS: &str =
    "id, namespace, kind, name, api_version, desired_spec, generation, revision, \
     created_at, updated_at, deleted_at";

impl PostgresStore {
    /// Connect to Postgres and, when the operator asked for it, run the
    /// embedded migrations before serving anything.
    pub async fn connect(config: &ApiConfig) -> StoreResult<Self> {
        let options = PgConnectOptions::from_str(&config.db_url)
            .map_err(|err| StoreError::Unexpected(err.into()))?;
        let pool = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .acquire_timeout(Duration::from_millis(config.db_acquire_timeout_ms))
            .connect_with(options)
            .await
            .map_err(db_err)?;

        if config.auto_migrate {
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .map_err(|err| StoreError::Unexpected(err.into()))?;
        }

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_resource_row(&self, id: Uuid) -> StoreResult<Resource> {
        let sql = format!("SELECT {RESOURCE_COLUMNS} FROM k_resources WHERE id = $1 AND deleted_at IS NULL");
        let row = sqlx::query_as::<_, DbResource>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or_else(|| StoreError::NotFound(format!("resource {id}")))?;
        Ok(row.into())
    }

    async fn attach_states(&self, resource: Resource) -> StoreResult<ResourceWithState> {
        let applied = sqlx::query_as::<_, DbAppliedState>(
            "SELECT id, resource_id, spec, generation, revision, status, error_message, \
             created_at, updated_at, deleted_at \
             FROM k_resource_applied_states WHERE resource_id = $1",
        )
        .bind(resource.id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .map(ResourceAppliedState::try_from)
        .transpose()?;

        let current = sqlx::query_as::<_, DbCurrentState>(
            "SELECT id, resource_id, spec, generation, revision, k8s_resource_version, \
             created_at, updated_at, deleted_at \
             FROM k_resource_current_states WHERE resource_id = $1",
        )
        .bind(resource.id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .map(ResourceCurrentState::from);

        Ok(ResourceWithState {
            resource,
            applied_state: applied,
            current_state: current,
        })
    }

    async fn sync_status_for(&self, gr: GlobalResource) -> StoreResult<GlobalResourceSyncStatus> {
        let total_clusters: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM k_clusters")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;

        let synced_rows = sqlx::query_as::<_, DbSyncedState>(
            "SELECT id, global_resource_id, cluster_id, synced_generation, \
             created_at, updated_at, deleted_at \
             FROM k_global_resource_synced_states \
             WHERE global_resource_id = $1 AND deleted_at IS NULL \
             ORDER BY cluster_id ASC",
        )
        .bind(gr.id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut clusters = Vec::with_capacity(synced_rows.len());
        let mut synced_clusters = 0i64;
        for row in synced_rows {
            let is_synced = row.synced_generation == gr.generation;
            if is_synced {
                synced_clusters += 1;
            }
            clusters.push(ClusterSyncStatus {
                cluster_id: row.cluster_id,
                synced_generation: row.synced_generation,
                is_synced,
            });
        }

        Ok(GlobalResourceSyncStatus {
            global_resource: gr,
            total_clusters,
            synced_clusters,
            clusters,
        })
    }
}

#[async_trait]
impl ClusterStore for PostgresStore {
    async fn register_cluster(&self, cluster_id: &str) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO k_clusters (id, created_at, updated_at) VALUES ($1, now(), now()) \
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(cluster_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn count_clusters(&self) -> StoreResult<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM k_clusters")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)
    }

    async fn list_api_keys(&self, cluster_id: &str) -> StoreResult<Vec<ClusterApiKey>> {
        let rows = sqlx::query_as::<_, DbApiKey>(
            "SELECT id, cluster_id, key_hash, name, created_at, updated_at, deleted_at \
             FROM k_cluster_api_keys WHERE cluster_id = $1 AND deleted_at IS NULL",
        )
        .bind(cluster_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().map(ClusterApiKey::from).collect())
    }

    async fn create_api_key(
        &self,
        cluster_id: &str,
        name: &str,
        key_hash: &str,
    ) -> StoreResult<ClusterApiKey> {
        let row = sqlx::query_as::<_, DbApiKey>(
            "INSERT INTO k_cluster_api_keys (id, cluster_id, key_hash, name, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, now(), now()) \
             RETURNING id, cluster_id, key_hash, name, created_at, updated_at, deleted_at",
        )
        .bind(Uuid::now_v7())
        .bind(cluster_id)
        .bind(key_hash)
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.into())
    }
}

#[async_trait]
impl ResourceStore for PostgresStore {
    async fn create_resource(&self, new: NewResource) -> StoreResult<Resource> {
        let sql = format!(
            "INSERT INTO k_resources \
             (id, cluster_id, namespace, kind, name, api_version, desired_spec, generation, revision, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, 1, $8, now(), now()) \
             RETURNING {RESOURCE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, DbResource>(&sql)
            .bind(Uuid::now_v7())
            .bind(&new.cluster_id)
            .bind(&new.namespace)
            .bind(&new.kind)
            .bind(&new.name)
            .bind(&new.api_version)
            .bind(&new.desired_spec)
            .bind(new.revision)
            .fetch_one(&self.pool)
            .await
            .map_err(|err| conflict_or_db_err(err, "resource already exists"))?;
        Ok(row.into())
    }

    async fn get_resource(&self, id: Uuid) -> StoreResult<ResourceWithState> {
        let resource = self.fetch_resource_row(id).await?;
        self.attach_states(resource).await
    }

    async fn get_resource_by_key(&self, key: &ResourceKey) -> StoreResult<ResourceWithState> {
        let sql = format!(
            "SELECT {RESOURCE_COLUMNS} FROM k_resources \
             WHERE cluster_id = $1 AND namespace = $2 AND kind = $3 AND name = $4 \
             AND deleted_at IS NULL"
        );
        let row = sqlx::query_as::<_, DbResource>(&sql)
            .bind(&key.cluster_id)
            .bind(&key.namespace)
            .bind(&key.kind)
            .bind(&key.name)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or_else(|| {
                StoreError::NotFound(format!(
                    "resource {}/{}/{} in cluster {}",
                    key.namespace, key.kind, key.name, key.cluster_id
                ))
            })?;
        self.attach_states(row.into()).await
    }

    async fn list_resources(
        &self,
        cluster_id: Option<&str>,
    ) -> StoreResult<Vec<ResourceWithState>> {
        let rows = match cluster_id {
            Some(cluster) => {
                let sql = format!(
                    "SELECT {RESOURCE_COLUMNS} FROM k_resources \
                     WHERE cluster_id = $1 AND deleted_at IS NULL ORDER BY created_at ASC"
                );
                sqlx::query_as::<_, DbResource>(&sql)
                    .bind(cluster)
                    .fetch_all(&self.pool)
                    .await
            }
            None => {
                let sql = format!(
                    "SELECT {RESOURCE_COLUMNS} FROM k_resources \
                     WHERE deleted_at IS NULL ORDER BY created_at ASC"
                );
                sqlx::query_as::<_, DbResource>(&sql).fetch_all(&self.pool).await
            }
        }
        .map_err(db_err)?;

        let mut result = Vec::with_capacity(rows.len());
        for row in rows {
            result.push(self.attach_states(row.into()).await?);
        }
        Ok(result)
    }

    async fn update_resource(
        &self,
        id: Uuid,
        desired_spec: Value,
        revision: Option<i32>,
    ) -> StoreResult<ResourceWithState> {
        // The generation trigger observes the spec/revision change; nothing
        // else on the row is touched.
        let done = sqlx::query(
            "UPDATE k_resources \
             SET desired_spec = $2, revision = COALESCE($3, revision + 1), updated_at = now() \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(&desired_spec)
        .bind(revision)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if done.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("resource {id}")));
        }
        self.get_resource(id).await
    }

    async fn soft_delete_resource(&self, id: Uuid) -> StoreResult<()> {
        let done = sqlx::query(
            "UPDATE k_resources SET deleted_at = now(), updated_at = now() \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if done.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("resource {id}")));
        }
        Ok(())
    }

    async fn soft_delete_resource_by_key(&self, key: &ResourceKey) -> StoreResult<()> {
        sqlx::query(
            "UPDATE k_resources SET deleted_at = now(), updated_at = now() \
             WHERE cluster_id = $1 AND namespace = $2 AND kind = $3 AND name = $4 \
             AND deleted_at IS NULL",
        )
        .bind(&key.cluster_id)
        .bind(&key.namespace)
        .bind(&key.kind)
        .bind(&key.name)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn upsert_resource(&self, new: NewResource) -> StoreResult<Resource> {
        let sql = format!(
            "INSERT INTO k_resources \
             (id, cluster_id, namespace, kind, name, api_version, desired_spec, generation, revision, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, 1, $8, now(), now()) \
             ON CONFLICT (cluster_id, namespace, kind, name) WHERE deleted_at IS NULL \
             DO UPDATE SET \
                 api_version = EXCLUDED.api_version, \
                 desired_spec = EXCLUDED.desired_spec, \
                 revision = EXCLUDED.revision, \
                 updated_at = now() \
             RETURNING {RESOURCE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, DbResource>(&sql)
            .bind(Uuid::now_v7())
            .bind(&new.cluster_id)
            .bind(&new.namespace)
            .bind(&new.kind)
            .bind(&new.name)
            .bind(&new.api_version)
            .bind(&new.desired_spec)
            .bind(new.revision)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.into())
    }

    async fn list_out_of_sync_resources(
        &self,
        cluster_id: &str,
        limit: i64,
    ) -> StoreResult<Vec<Resource>> {
        // A resource is out of sync when no applied row exists yet or the
        // applied generation trails the resource generation.
        let rows = sqlx::query_as::<_, DbResource>(
            "SELECT r.id, r.cluster_id, r.namespace, r.kind, r.name, r.api_version, \
                    r.desired_spec, r.generation, r.revision, r.created_at, r.updated_at, r.deleted_at \
             FROM k_resources r \
             LEFT JOIN k_resource_applied_states a \
                 ON a.resource_id = r.id AND a.deleted_at IS NULL \
             WHERE r.cluster_id = $1 \
               AND r.deleted_at IS NULL \
               AND (a.id IS NULL OR a.generation <> r.generation) \
             ORDER BY r.created_at ASC \
             LIMIT $2",
        )
        .bind(cluster_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().map(Resource::from).collect())
    }

    async fn list_deleted_resources(
        &self,
        cluster_id: &str,
        limit: i64,
    ) -> StoreResult<Vec<Resource>> {
        let sql = format!(
            "SELECT {RESOURCE_COLUMNS} FROM k_resources \
             WHERE cluster_id = $1 AND deleted_at IS NOT NULL \
             ORDER BY deleted_at ASC LIMIT $2"
        );
        let rows = sqlx::query_as::<_, DbResource>(&sql)
            .bind(cluster_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(rows.into_iter().map(Resource::from).collect())
    }

    async fn hard_delete_resource(&self, id: Uuid, cluster_id: &str) -> StoreResult<()> {
        // Ownership check and delete in one scoped statement; foreign rows
        // look identical to missing ones.
        let done = sqlx::query("DELETE FROM k_resources WHERE id = $1 AND cluster_id = $2")
            .bind(id)
            .bind(cluster_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        if done.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("resource {id}")));
        }
        Ok(())
    }

    async fn get_resource_cluster(&self, id: Uuid) -> StoreResult<String> {
        sqlx::query_scalar("SELECT cluster_id FROM k_resources WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or_else(|| StoreError::NotFound(format!("resource {id}")))
    }

    async fn upsert_applied_state(
        &self,
        resource_id: Uuid,
        update: AppliedStateUpdate,
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let existing: Option<Uuid> = sqlx::query_scalar(
            "SELECT id FROM k_resource_applied_states WHERE resource_id = $1 FOR UPDATE",
        )
        .bind(resource_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        if existing.is_none() {
            sqlx::query(
                "INSERT INTO k_resource_applied_states \
                 (id, resource_id, generation, revision, status, created_at, updated_at) \
                 VALUES ($1, $2, 0, 0, 'pending', now(), now())",
            )
            .bind(Uuid::now_v7())
            .bind(resource_id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        // COALESCE keeps the previous generation/revision on error reports so
        // a failed apply never marks the resource as caught up.
        sqlx::query(
            "UPDATE k_resource_applied_states \
             SET spec = COALESCE($2, spec), \
                 generation = COALESCE($3, generation), \
                 revision = COALESCE($4, revision), \
                 status = $5, \
                 error_message = $6, \
                 updated_at = now() \
             WHERE resource_id = $1",
        )
        .bind(resource_id)
        .bind(&update.spec)
        .bind(update.generation)
        .bind(update.revision)
        .bind(update.status.as_str())
        .bind(&update.error_message)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)
    }

    async fn upsert_current_state(
        &self,
        resource_id: Uuid,
        update: CurrentStateUpdate,
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let stored_version: Option<String> = sqlx::query_scalar(
            "SELECT k8s_resource_version FROM k_resource_current_states \
             WHERE resource_id = $1 FOR UPDATE",
        )
        .bind(resource_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        match stored_version {
            // Same observed version: replayed event, nothing to write.
            Some(version) if version == update.k8s_resource_version => {
                return tx.commit().await.map_err(db_err);
            }
            Some(_) => {
                sqlx::query(
                    "UPDATE k_resource_current_states \
                     SET spec = $2, generation = $3, revision = $4, \
                         k8s_resource_version = $5, updated_at = now() \
                     WHERE resource_id = $1",
                )
                .bind(resource_id)
                .bind(&update.spec)
                .bind(update.generation)
                .bind(update.revision)
                .bind(&update.k8s_resource_version)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
            }
            None => {
                sqlx::query(
                    "INSERT INTO k_resource_current_states \
                     (id, resource_id, spec, generation, revision, k8s_resource_version, created_at, updated_at) \
                     VALUES ($1, $2, $3, $4, $5, $6, now(), now())",
                )
                .bind(Uuid::now_v7())
                .bind(resource_id)
                .bind(&update.spec)
                .bind(update.generation)
                .bind(update.revision)
                .bind(&update.k8s_resource_version)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
            }
        }

        tx.commit().await.map_err(db_err)
    }

    async fn delete_current_state(&self, resource_id: Uuid) -> StoreResult<()> {
        sqlx::query("DELETE FROM k_resource_current_states WHERE resource_id = $1")
            .bind(resource_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

#[async_trait]
impl GlobalResourceStore for PostgresStore {
    async fn create_global_resource(&self, new: NewGlobalResource) -> StoreResult<GlobalResource> {
        let sql = format!(
            "INSERT INTO k_global_resources \
             (id, namespace, kind, name, api_version, desired_spec, generation, revision, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, 1, $7, now(), now()) \
             RETURNING {GLOBAL_RESOURCE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, DbGlobalResource>(&sql)
            .bind(Uuid::now_v7())
            .bind(&new.namespace)
            .bind(&new.kind)
            .bind(&new.name)
            .bind(&new.api_version)
            .bind(&new.desired_spec)
            .bind(new.revision)
            .fetch_one(&self.pool)
            .await
            .map_err(|err| conflict_or_db_err(err, "global resource already exists"))?;
        Ok(row.into())
    }

    async fn get_global_resource(&self, id: Uuid) -> StoreResult<GlobalResourceSyncStatus> {
        let sql = format!(
            "SELECT {GLOBAL_RESOURCE_COLUMNS} FROM k_global_resources \
             WHERE id = $1 AND deleted_at IS NULL"
        );
        let row = sqlx::query_as::<_, DbGlobalResource>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or_else(|| StoreError::NotFound(format!("global resource {id}")))?;
        self.sync_status_for(row.into()).await
    }

    async fn get_global_resource_by_key(
        &self,
        key: &GlobalResourceKey,
    ) -> StoreResult<GlobalResourceSyncStatus> {
        let sql = format!(
            "SELECT {GLOBAL_RESOURCE_COLUMNS} FROM k_global_resources \
             WHERE namespace = $1 AND kind = $2 AND name = $3 AND deleted_at IS NULL"
        );
        let row = sqlx::query_as::<_, DbGlobalResource>(&sql)
            .bind(&key.namespace)
            .bind(&key.kind)
            .bind(&key.name)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or_else(|| {
                StoreError::NotFound(format!(
                    "global resource {}/{}/{}",
                    key.namespace, key.kind, key.name
                ))
            })?;
        self.sync_status_for(row.into()).await
    }

    async fn list_global_resources(&self) -> StoreResult<Vec<GlobalResourceSyncStatus>> {
        let sql = format!(
            "SELECT {GLOBAL_RESOURCE_COLUMNS} FROM k_global_resources \
             WHERE deleted_at IS NULL ORDER BY created_at ASC"
        );
        let rows = sqlx::query_as::<_, DbGlobalResource>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        let mut result = Vec::with_capacity(rows.len());
        for row in rows {
            result.push(self.sync_status_for(row.into()).await?);
        }
        Ok(result)
    }

    async fn update_global_resource(
        &self,
        id: Uuid,
        desired_spec: Value,
        revision: Option<i32>,
    ) -> StoreResult<GlobalResourceSyncStatus> {
        let done = sqlx::query(
            "UPDATE k_global_resources \
             SET desired_spec = $2, revision = COALESCE($3, revision + 1), updated_at = now() \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(&desired_spec)
        .bind(revision)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if done.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("global resource {id}")));
        }
        self.get_global_resource(id).await
    }

    async fn soft_delete_global_resource(&self, id: Uuid) -> StoreResult<()> {
        let done = sqlx::query(
            "UPDATE k_global_resources SET deleted_at = now(), updated_at = now() \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if done.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("global resource {id}")));
        }
        Ok(())
    }

    async fn upsert_global_resource(&self, new: NewGlobalResource) -> StoreResult<GlobalResource> {
        // Re-declaring an existing key bumps the revision, which moves the
        // generation and fans the change back out to every cluster.
        let sql = format!(
            "INSERT INTO k_global_resources \
             (id, namespace, kind, name, api_version, desired_spec, generation, revision, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, 1, $7, now(), now()) \
             ON CONFLICT (namespace, kind, name) WHERE deleted_at IS NULL \
             DO UPDATE SET \
                 api_version = EXCLUDED.api_version, \
                 desired_spec = EXCLUDED.desired_spec, \
                 revision = k_global_resources.revision + 1, \
                 updated_at = now() \
             RETURNING {GLOBAL_RESOURCE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, DbGlobalResource>(&sql)
            .bind(Uuid::now_v7())
            .bind(&new.namespace)
            .bind(&new.kind)
            .bind(&new.name)
            .bind(&new.api_version)
            .bind(&new.desired_spec)
            .bind(new.revision)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.into())
    }

    async fn list_out_of_sync_global_resources(
        &self,
        cluster_id: &str,
        limit: i64,
    ) -> StoreResult<Vec<GlobalResource>> {
        let rows = sqlx::query_as::<_, DbGlobalResource>(
            "SELECT gr.id, gr.namespace, gr.kind, gr.name, gr.api_version, gr.desired_spec, \
                    gr.generation, gr.revision, gr.created_at, gr.updated_at, gr.deleted_at \
             FROM k_global_resources gr \
             LEFT JOIN k_global_resource_synced_states ss \
                 ON ss.global_resource_id = gr.id \
                AND ss.cluster_id = $1 \
                AND ss.deleted_at IS NULL \
             WHERE gr.deleted_at IS NULL \
               AND (ss.id IS NULL OR ss.synced_generation < gr.generation) \
             ORDER BY gr.created_at ASC \
             LIMIT $2",
        )
        .bind(cluster_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().map(GlobalResource::from).collect())
    }

    async fn list_deleted_global_resources(&self, limit: i64) -> StoreResult<Vec<GlobalResource>> {
        let sql = format!(
            "SELECT {GLOBAL_RESOURCE_COLUMNS} FROM k_global_resources \
             WHERE deleted_at IS NOT NULL ORDER BY deleted_at ASC LIMIT $1"
        );
        let rows = sqlx::query_as::<_, DbGlobalResource>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(rows.into_iter().map(GlobalResource::from).collect())
    }

    async fn upsert_synced_state(
        &self,
        global_resource_id: Uuid,
        cluster_id: &str,
        synced_generation: i32,
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let existing: Option<Uuid> = sqlx::query_scalar(
            "SELECT id FROM k_global_resource_synced_states \
             WHERE global_resource_id = $1 AND cluster_id = $2 FOR UPDATE",
        )
        .bind(global_resource_id)
        .bind(cluster_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        match existing {
            Some(id) => {
                sqlx::query(
                    "UPDATE k_global_resource_synced_states \
                     SET synced_generation = $2, updated_at = now() WHERE id = $1",
                )
                .bind(id)
                .bind(synced_generation)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
            }
            None => {
                sqlx::query(
                    "INSERT INTO k_global_resource_synced_states \
                     (id, global_resource_id, cluster_id, synced_generation, created_at, updated_at) \
                     VALUES ($1, $2, $3, $4, now(), now())",
                )
                .bind(Uuid::now_v7())
                .bind(global_resource_id)
                .bind(cluster_id)
                .bind(synced_generation)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
            }
        }

        tx.commit().await.map_err(db_err)
    }

    async fn delete_synced_state(
        &self,
        global_resource_id: Uuid,
        cluster_id: &str,
    ) -> StoreResult<()> {
        sqlx::query(
            "DELETE FROM k_global_resource_synced_states \
             WHERE global_resource_id = $1 AND cluster_id = $2",
        )
        .bind(global_resource_id)
        .bind(cluster_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }
}

#[async_trait]
impl CoordinatorStore for PostgresStore {
    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

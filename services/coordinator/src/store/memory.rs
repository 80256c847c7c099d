//! In-memory implementation of the coordinator store.
//!
//! # Purpose
//! Implements the store traits with plain maps behind a `tokio::sync::RwLock`
//! for tests and local development. Not durable; state is lost on restart.
//!
//! # Generation invariant
//! Postgres enforces the generation bump with a trigger. This backend has no
//! triggers, so every resource/global-resource mutation funnels through
//! [`touch_resource`] / [`touch_global`], which compare the trigger-relevant
//! fields before and after the closure runs and assign the generation
//! themselves. Mutations cannot write the generation column directly.
use super::{
    ClusterStore, CoordinatorStore, GlobalResourceStore, ResourceStore, StoreError, StoreResult,
};
use crate::model::{
    AppliedStateUpdate, AppliedStatus, Cluster, ClusterApiKey, ClusterSyncStatus,
    CurrentStateUpdate, GlobalResource, GlobalResourceKey, GlobalResourceSyncStatus,
    GlobalResourceSyncedState, NewGlobalResource, NewResource, Resource, ResourceAppliedState,
    ResourceCurrentState, ResourceKey, ResourceWithState,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    clusters: BTreeMap<String, Cluster>,
    api_keys: Vec<ClusterApiKey>,
    resources: BTreeMap<Uuid, Resource>,
    // State rows keyed by resource id; at most one row per resource.
    applied: HashMap<Uuid, ResourceAppliedState>,
    current: HashMap<Uuid, ResourceCurrentState>,
    globals: BTreeMap<Uuid, GlobalResource>,
    synced: BTreeMap<(Uuid, String), GlobalResourceSyncedState>,
}

#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Mutate a resource through a closure and re-derive the generation the way
/// the database trigger would: +1 iff desired_spec, revision, or deleted_at
/// changed, regardless of what the closure wrote to `generation`.
fn touch_resource(resource: &mut Resource, mutate: impl FnOnce(&mut Resource)) {
    let old_generation = resource.generation;
    let old_spec = resource.desired_spec.clone();
    let old_revision = resource.revision;
    let old_deleted_at = resource.deleted_at;

    mutate(resource);
    resource.updated_at = Utc::now();

    resource.generation = old_generation;
    if resource.desired_spec != old_spec
        || resource.revision != old_revision
        || resource.deleted_at != old_deleted_at
    {
        resource.generation += 1;
    }
}

/// Same contract as [`touch_resource`], for global resources.
fn touch_global(global: &mut GlobalResource, mutate: impl FnOnce(&mut GlobalResource)) {
    let old_generation = global.generation;
    let old_spec = global.desired_spec.clone();
    let old_revision = global.revision;
    let old_deleted_at = global.deleted_at;

    mutate(global);
    global.updated_at = Utc::now();

    global.generation = old_generation;
    if global.desired_spec != old_spec
        || global.revision != old_revision
        || global.deleted_at != old_deleted_at
    {
        global.generation += 1;
    }
}

impl Inner {
    fn live_resource_by_key(&self, key: &ResourceKey) -> Option<Uuid> {
        self.resources
            .values()
            .find(|r| {
                r.deleted_at.is_none()
                    && r.cluster_id == key.cluster_id
                    && r.namespace == key.namespace
                    && r.kind == key.kind
                    && r.name == key.name
            })
            .map(|r| r.id)
    }

    fn live_global_by_key(&self, key: &GlobalResourceKey) -> Option<Uuid> {
        self.globals
            .values()
            .find(|g| {
                g.deleted_at.is_none()
                    && g.namespace == key.namespace
                    && g.kind == key.kind
                    && g.name == key.name
            })
            .map(|g| g.id)
    }

    fn with_states(&self, resource: Resource) -> ResourceWithState {
        let applied_state = self.applied.get(&resource.id).cloned();
        let current_state = self.current.get(&resource.id).cloned();
        ResourceWithState {
            resource,
            applied_state,
            current_state,
        }
    }

    fn sync_status_for(&self, global: GlobalResource) -> GlobalResourceSyncStatus {
        let total_clusters = self.clusters.len() as i64;
        let mut clusters = Vec::new();
        let mut synced_clusters = 0i64;
        for state in self.synced.values() {
            if state.global_resource_id != global.id || state.deleted_at.is_some() {
                continue;
            }
            let is_synced = state.synced_generation == global.generation;
            if is_synced {
                synced_clusters += 1;
            }
            clusters.push(ClusterSyncStatus {
                cluster_id: state.cluster_id.clone(),
                synced_generation: state.synced_generation,
                is_synced,
            });
        }
        GlobalResourceSyncStatus {
            global_resource: global,
            total_clusters,
            synced_clusters,
            clusters,
        }
    }
}

#[async_trait]
impl ClusterStore for InMemoryStore {
    async fn register_cluster(&self, cluster_id: &str) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        inner
            .clusters
            .entry(cluster_id.to_string())
            .or_insert_with(|| {
                let now = Utc::now();
                Cluster {
                    id: cluster_id.to_string(),
                    created_at: now,
                    updated_at: now,
                }
            });
        Ok(())
    }

    async fn count_clusters(&self) -> StoreResult<i64> {
        Ok(self.inner.read().await.clusters.len() as i64)
    }

    async fn list_api_keys(&self, cluster_id: &str) -> StoreResult<Vec<ClusterApiKey>> {
        let inner = self.inner.read().await;
        Ok(inner
            .api_keys
            .iter()
            .filter(|k| k.cluster_id == cluster_id && k.deleted_at.is_none())
            .cloned()
            .collect())
    }

    async fn create_api_key(
        &self,
        cluster_id: &str,
        name: &str,
        key_hash: &str,
    ) -> StoreResult<ClusterApiKey> {
        let now = Utc::now();
        let key = ClusterApiKey {
            id: Uuid::now_v7(),
            cluster_id: cluster_id.to_string(),
            key_hash: key_hash.to_string(),
            name: name.to_string(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        self.inner.write().await.api_keys.push(key.clone());
        Ok(key)
    }
}

#[async_trait]
impl ResourceStore for InMemoryStore {
    async fn create_resource(&self, new: NewResource) -> StoreResult<Resource> {
        let mut inner = self.inner.write().await;
        let key = ResourceKey {
            cluster_id: new.cluster_id.clone(),
            namespace: new.namespace.clone(),
            kind: new.kind.clone(),
            name: new.name.clone(),
        };
        if inner.live_resource_by_key(&key).is_some() {
            return Err(StoreError::Conflict("resource already exists".to_string()));
        }
        let now = Utc::now();
        let resource = Resource {
            id: Uuid::now_v7(),
            cluster_id: new.cluster_id,
            namespace: new.namespace,
            kind: new.kind,
            name: new.name,
            api_version: new.api_version,
            desired_spec: new.desired_spec,
            generation: 1,
            revision: new.revision,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        inner.resources.insert(resource.id, resource.clone());
        Ok(resource)
    }

    async fn get_resource(&self, id: Uuid) -> StoreResult<ResourceWithState> {
        let inner = self.inner.read().await;
        let resource = inner
            .resources
            .get(&id)
            .filter(|r| r.deleted_at.is_none())
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("resource {id}")))?;
        Ok(inner.with_states(resource))
    }

    async fn get_resource_by_key(&self, key: &ResourceKey) -> StoreResult<ResourceWithState> {
        let inner = self.inner.read().await;
        let resource = inner
            .live_resource_by_key(key)
            .and_then(|id| inner.resources.get(&id).cloned())
            .ok_or_else(|| {
                StoreError::NotFound(format!(
                    "resource {}/{}/{} in cluster {}",
                    key.namespace, key.kind, key.name, key.cluster_id
                ))
            })?;
        Ok(inner.with_states(resource))
    }

    async fn list_resources(
        &self,
        cluster_id: Option<&str>,
    ) -> StoreResult<Vec<ResourceWithState>> {
        let inner = self.inner.read().await;
        let mut rows: Vec<Resource> = inner
            .resources
            .values()
            .filter(|r| r.deleted_at.is_none())
            .filter(|r| cluster_id.map_or(true, |c| r.cluster_id == c))
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.created_at);
        Ok(rows.into_iter().map(|r| inner.with_states(r)).collect())
    }

    async fn update_resource(
        &self,
        id: Uuid,
        desired_spec: serde_json::Value,
        revision: Option<i32>,
    ) -> StoreResult<ResourceWithState> {
        {
            let mut inner = self.inner.write().await;
            let resource = inner
                .resources
                .get_mut(&id)
                .filter(|r| r.deleted_at.is_none())
                .ok_or_else(|| StoreError::NotFound(format!("resource {id}")))?;
            touch_resource(resource, |r| {
                r.desired_spec = desired_spec;
                r.revision = revision.unwrap_or(r.revision + 1);
            });
        }
        self.get_resource(id).await
    }

    async fn soft_delete_resource(&self, id: Uuid) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let resource = inner
            .resources
            .get_mut(&id)
            .filter(|r| r.deleted_at.is_none())
            .ok_or_else(|| StoreError::NotFound(format!("resource {id}")))?;
        touch_resource(resource, |r| r.deleted_at = Some(Utc::now()));
        Ok(())
    }

    async fn soft_delete_resource_by_key(&self, key: &ResourceKey) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if let Some(id) = inner.live_resource_by_key(key) {
            if let Some(resource) = inner.resources.get_mut(&id) {
                touch_resource(resource, |r| r.deleted_at = Some(Utc::now()));
            }
        }
        Ok(())
    }

    async fn upsert_resource(&self, new: NewResource) -> StoreResult<Resource> {
        let mut inner = self.inner.write().await;
        let key = ResourceKey {
            cluster_id: new.cluster_id.clone(),
            namespace: new.namespace.clone(),
            kind: new.kind.clone(),
            name: new.name.clone(),
        };
        if let Some(id) = inner.live_resource_by_key(&key) {
            if let Some(resource) = inner.resources.get_mut(&id) {
                touch_resource(resource, |r| {
                    r.api_version = new.api_version.clone();
                    r.desired_spec = new.desired_spec.clone();
                    r.revision = new.revision;
                });
                return Ok(resource.clone());
            }
        }
        let now = Utc::now();
        let resource = Resource {
            id: Uuid::now_v7(),
            cluster_id: new.cluster_id,
            namespace: new.namespace,
            kind: new.kind,
            name: new.name,
            api_version: new.api_version,
            desired_spec: new.desired_spec,
            generation: 1,
            revision: new.revision,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        inner.resources.insert(resource.id, resource.clone());
        Ok(resource)
    }

    async fn list_out_of_sync_resources(
        &self,
        cluster_id: &str,
        limit: i64,
    ) -> StoreResult<Vec<Resource>> {
        let inner = self.inner.read().await;
        let mut rows: Vec<Resource> = inner
            .resources
            .values()
            .filter(|r| r.deleted_at.is_none() && r.cluster_id == cluster_id)
            .filter(|r| match inner.applied.get(&r.id) {
                Some(applied) if applied.deleted_at.is_none() => {
                    applied.generation != r.generation
                }
                _ => true,
            })
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.created_at);
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn list_deleted_resources(
        &self,
        cluster_id: &str,
        limit: i64,
    ) -> StoreResult<Vec<Resource>> {
        let inner = self.inner.read().await;
        let mut rows: Vec<Resource> = inner
            .resources
            .values()
            .filter(|r| r.deleted_at.is_some() && r.cluster_id == cluster_id)
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.deleted_at);
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn hard_delete_resource(&self, id: Uuid, cluster_id: &str) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        match inner.resources.get(&id) {
            Some(resource) if resource.cluster_id == cluster_id => {
                inner.resources.remove(&id);
                // Cascade, mirroring the foreign keys in Postgres.
                inner.applied.remove(&id);
                inner.current.remove(&id);
                Ok(())
            }
            _ => Err(StoreError::NotFound(format!("resource {id}"))),
        }
    }

    async fn get_resource_cluster(&self, id: Uuid) -> StoreResult<String> {
        let inner = self.inner.read().await;
        inner
            .resources
            .get(&id)
            .map(|r| r.cluster_id.clone())
            .ok_or_else(|| StoreError::NotFound(format!("resource {id}")))
    }

    async fn upsert_applied_state(
        &self,
        resource_id: Uuid,
        update: AppliedStateUpdate,
    ) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();
        let state = inner
            .applied
            .entry(resource_id)
            .or_insert_with(|| ResourceAppliedState {
                id: Uuid::now_v7(),
                resource_id,
                spec: None,
                generation: 0,
                revision: 0,
                status: AppliedStatus::Pending,
                error_message: None,
                created_at: now,
                updated_at: now,
                deleted_at: None,
            });
        if let Some(spec) = update.spec {
            state.spec = Some(spec);
        }
        if let Some(generation) = update.generation {
            state.generation = generation;
        }
        if let Some(revision) = update.revision {
            state.revision = revision;
        }
        state.status = update.status;
        state.error_message = update.error_message;
        state.updated_at = now;
        Ok(())
    }

    async fn upsert_current_state(
        &self,
        resource_id: Uuid,
        update: CurrentStateUpdate,
    ) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();
        match inner.current.get_mut(&resource_id) {
            // Replayed observation: nothing to write.
            Some(state) if state.k8s_resource_version == update.k8s_resource_version => Ok(()),
            Some(state) => {
                state.spec = update.spec;
                state.generation = update.generation;
                state.revision = update.revision;
                state.k8s_resource_version = update.k8s_resource_version;
                state.updated_at = now;
                Ok(())
            }
            None => {
                inner.current.insert(
                    resource_id,
                    ResourceCurrentState {
                        id: Uuid::now_v7(),
                        resource_id,
                        spec: update.spec,
                        generation: update.generation,
                        revision: update.revision,
                        k8s_resource_version: update.k8s_resource_version,
                        created_at: now,
                        updated_at: now,
                        deleted_at: None,
                    },
                );
                Ok(())
            }
        }
    }

    async fn delete_current_state(&self, resource_id: Uuid) -> StoreResult<()> {
        self.inner.write().await.current.remove(&resource_id);
        Ok(())
    }
}

#[async_trait]
impl GlobalResourceStore for InMemoryStore {
    async fn create_global_resource(&self, new: NewGlobalResource) -> StoreResult<GlobalResource> {
        let mut inner = self.inner.write().await;
        let key = GlobalResourceKey {
            namespace: new.namespace.clone(),
            kind: new.kind.clone(),
            name: new.name.clone(),
        };
        if inner.live_global_by_key(&key).is_some() {
            return Err(StoreError::Conflict(
                "global resource already exists".to_string(),
            ));
        }
        let now = Utc::now();
        let global = GlobalResource {
            id: Uuid::now_v7(),
            namespace: new.namespace,
            kind: new.kind,
            name: new.name,
            api_version: new.api_version,
            desired_spec: new.desired_spec,
            generation: 1,
            revision: new.revision,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        inner.globals.insert(global.id, global.clone());
        Ok(global)
    }

    async fn get_global_resource(&self, id: Uuid) -> StoreResult<GlobalResourceSyncStatus> {
        let inner = self.inner.read().await;
        let global = inner
            .globals
            .get(&id)
            .filter(|g| g.deleted_at.is_none())
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("global resource {id}")))?;
        Ok(inner.sync_status_for(global))
    }

    async fn get_global_resource_by_key(
        &self,
        key: &GlobalResourceKey,
    ) -> StoreResult<GlobalResourceSyncStatus> {
        let inner = self.inner.read().await;
        let global = inner
            .live_global_by_key(key)
            .and_then(|id| inner.globals.get(&id).cloned())
            .ok_or_else(|| {
                StoreError::NotFound(format!(
                    "global resource {}/{}/{}",
                    key.namespace, key.kind, key.name
                ))
            })?;
        Ok(inner.sync_status_for(global))
    }

    async fn list_global_resources(&self) -> StoreResult<Vec<GlobalResourceSyncStatus>> {
        let inner = self.inner.read().await;
        let mut rows: Vec<GlobalResource> = inner
            .globals
            .values()
            .filter(|g| g.deleted_at.is_none())
            .cloned()
            .collect();
        rows.sort_by_key(|g| g.created_at);
        Ok(rows.into_iter().map(|g| inner.sync_status_for(g)).collect())
    }

    async fn update_global_resource(
        &self,
        id: Uuid,
        desired_spec: serde_json::Value,
        revision: Option<i32>,
    ) -> StoreResult<GlobalResourceSyncStatus> {
        {
            let mut inner = self.inner.write().await;
            let global = inner
                .globals
                .get_mut(&id)
                .filter(|g| g.deleted_at.is_none())
                .ok_or_else(|| StoreError::NotFound(format!("global resource {id}")))?;
            touch_global(global, |g| {
                g.desired_spec = desired_spec;
                g.revision = revision.unwrap_or(g.revision + 1);
            });
        }
        self.get_global_resource(id).await
    }

    async fn soft_delete_global_resource(&self, id: Uuid) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let global = inner
            .globals
            .get_mut(&id)
            .filter(|g| g.deleted_at.is_none())
            .ok_or_else(|| StoreError::NotFound(format!("global resource {id}")))?;
        touch_global(global, |g| g.deleted_at = Some(Utc::now()));
        Ok(())
    }

    async fn upsert_global_resource(&self, new: NewGlobalResource) -> StoreResult<GlobalResource> {
        let mut inner = self.inner.write().await;
        let key = GlobalResourceKey {
            namespace: new.namespace.clone(),
            kind: new.kind.clone(),
            name: new.name.clone(),
        };
        if let Some(id) = inner.live_global_by_key(&key) {
            if let Some(global) = inner.globals.get_mut(&id) {
                touch_global(global, |g| {
                    g.api_version = new.api_version.clone();
                    g.desired_spec = new.desired_spec.clone();
                    g.revision += 1;
                });
                return Ok(global.clone());
            }
        }
        let now = Utc::now();
        let global = GlobalResource {
            id: Uuid::now_v7(),
            namespace: new.namespace,
            kind: new.kind,
            name: new.name,
            api_version: new.api_version,
            desired_spec: new.desired_spec,
            generation: 1,
            revision: new.revision,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        inner.globals.insert(global.id, global.clone());
        Ok(global)
    }

    async fn list_out_of_sync_global_resources(
        &self,
        cluster_id: &str,
        limit: i64,
    ) -> StoreResult<Vec<GlobalResource>> {
        let inner = self.inner.read().await;
        let mut rows: Vec<GlobalResource> = inner
            .globals
            .values()
            .filter(|g| g.deleted_at.is_none())
            .filter(|g| {
                match inner.synced.get(&(g.id, cluster_id.to_string())) {
                    Some(state) if state.deleted_at.is_none() => {
                        state.synced_generation < g.generation
                    }
                    _ => true,
                }
            })
            .cloned()
            .collect();
        rows.sort_by_key(|g| g.created_at);
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn list_deleted_global_resources(&self, limit: i64) -> StoreResult<Vec<GlobalResource>> {
        let inner = self.inner.read().await;
        let mut rows: Vec<GlobalResource> = inner
            .globals
            .values()
            .filter(|g| g.deleted_at.is_some())
            .cloned()
            .collect();
        rows.sort_by_key(|g| g.deleted_at);
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn upsert_synced_state(
        &self,
        global_resource_id: Uuid,
        cluster_id: &str,
        synced_generation: i32,
    ) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();
        let entry = inner
            .synced
            .entry((global_resource_id, cluster_id.to_string()))
            .or_insert_with(|| GlobalResourceSyncedState {
                id: Uuid::now_v7(),
                global_resource_id,
                cluster_id: cluster_id.to_string(),
                synced_generation,
                created_at: now,
                updated_at: now,
                deleted_at: None,
            });
        entry.synced_generation = synced_generation;
        entry.updated_at = now;
        Ok(())
    }

    async fn delete_synced_state(
        &self,
        global_resource_id: Uuid,
        cluster_id: &str,
    ) -> StoreResult<()> {
        self.inner
            .write()
            .await
            .synced
            .remove(&(global_resource_id, cluster_id.to_string()));
        Ok(())
    }
}

#[async_trait]
impl CoordinatorStore for InMemoryStore {
    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

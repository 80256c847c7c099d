//! Postgres store tests.
//!
//! Skipped unless `KONTROL_TEST_DB_URL` points at a throwaway database; the
//! suite truncates every table before each test.
use coordinator::config::ApiConfig;
use coordinator::model::{
    AppliedStateUpdate, AppliedStatus, CurrentStateUpdate, NewGlobalResource, NewResource,
    ResourceKey,
};
use coordinator::store::postgres::PostgresStore;
use coordinator::store::{
    ClusterStore, GlobalResourceStore, ResourceStore, StoreError,
};
use serde_json::json;
use serial_test::serial;

async fn test_store() -> Option<PostgresStore> {
    let Ok(db_url) = std::env::var("KONTROL_TEST_DB_URL") else {
        eprintln!("KONTROL_TEST_DB_URL not set; skipping postgres store test");
        return None;
    };
    let config = ApiConfig {
        db_url,
        server_port: 0,
        auto_migrate: true,
        db_max_connections: 5,
        db_acquire_timeout_ms: 5000,
    };
    let store = PostgresStore::connect(&config).await.expect("connect");
    sqlx::query(
        "TRUNCATE k_cluster_api_keys, k_resource_applied_states, k_resource_current_states, \
         k_global_resource_synced_states, k_resources, k_global_resources, k_clusters CASCADE",
    )
    .execute(store.pool())
    .await
    .expect("truncate");
    Some(store)
}

fn new_resource(cluster: &str, name: &str) -> NewResource {
    NewResource {
        cluster_id: cluster.to_string(),
        namespace: "default".to_string(),
        kind: "ConfigMap".to_string(),
        name: name.to_string(),
        api_version: "v1".to_string(),
        desired_spec: json!({"data": {"k": "v"}}),
        revision: 1,
    }
}

#[serial]
#[tokio::test]
async fn trigger_bumps_generation_only_on_meaningful_change() {
    let Some(store) = test_store().await else { return };

    let created = store.create_resource(new_resource("c1", "cm1")).await.unwrap();
    assert_eq!(created.generation, 1);

    let updated = store
        .update_resource(created.id, json!({"data": {"k": "v2"}}), Some(1))
        .await
        .unwrap();
    assert_eq!(updated.resource.generation, 2);

    // Writing the same spec and revision again leaves the generation alone.
    let updated = store
        .update_resource(created.id, json!({"data": {"k": "v2"}}), Some(1))
        .await
        .unwrap();
    assert_eq!(updated.resource.generation, 2);

    store
        .soft_delete_resource_by_key(&ResourceKey {
            cluster_id: "c1".to_string(),
            namespace: "default".to_string(),
            kind: "ConfigMap".to_string(),
            name: "cm1".to_string(),
        })
        .await
        .unwrap();
    let deleted = store.list_deleted_resources("c1", 100).await.unwrap();
    assert_eq!(deleted.len(), 1);
    assert_eq!(deleted[0].generation, 3);
}

#[serial]
#[tokio::test]
async fn upsert_lands_on_the_existing_row() {
    let Some(store) = test_store().await else { return };

    let first = store.upsert_resource(new_resource("c1", "cm1")).await.unwrap();
    let mut again = new_resource("c1", "cm1");
    again.desired_spec = json!({"data": {"k": "v2"}});
    again.revision = 2;
    let second = store.upsert_resource(again).await.unwrap();

    assert_eq!(second.id, first.id);
    assert_eq!(second.generation, 2);
    assert_eq!(second.revision, 2);
    assert_eq!(store.list_resources(Some("c1")).await.unwrap().len(), 1);

    // Plain create on a live key conflicts instead of duplicating.
    let err = store.create_resource(new_resource("c1", "cm1")).await.unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));
}

#[serial]
#[tokio::test]
async fn out_of_sync_queue_follows_the_applied_row() {
    let Some(store) = test_store().await else { return };

    let created = store.create_resource(new_resource("c1", "cm1")).await.unwrap();
    assert_eq!(
        store.list_out_of_sync_resources("c1", 100).await.unwrap().len(),
        1
    );
    // Another cluster's queue stays empty.
    assert!(store.list_out_of_sync_resources("c2", 100).await.unwrap().is_empty());

    store
        .upsert_applied_state(
            created.id,
            AppliedStateUpdate {
                spec: Some(json!({"data": {"k": "v"}})),
                generation: Some(1),
                revision: Some(1),
                status: AppliedStatus::Success,
                error_message: None,
            },
        )
        .await
        .unwrap();
    assert!(store.list_out_of_sync_resources("c1", 100).await.unwrap().is_empty());

    // An error report keeps the stored generation, so an update requeues and
    // the queue stays populated after the failure.
    store
        .update_resource(created.id, json!({"data": {"k": "v2"}}), None)
        .await
        .unwrap();
    store
        .upsert_applied_state(
            created.id,
            AppliedStateUpdate {
                spec: None,
                generation: None,
                revision: None,
                status: AppliedStatus::Error,
                error_message: Some("apply failed".to_string()),
            },
        )
        .await
        .unwrap();
    assert_eq!(
        store.list_out_of_sync_resources("c1", 100).await.unwrap().len(),
        1
    );
    let applied = store
        .get_resource(created.id)
        .await
        .unwrap()
        .applied_state
        .unwrap();
    assert_eq!(applied.generation, 1);
    assert_eq!(applied.status, AppliedStatus::Error);
    assert_eq!(applied.error_message.as_deref(), Some("apply failed"));
}

#[serial]
#[tokio::test]
async fn hard_delete_cascades_and_enforces_ownership() {
    let Some(store) = test_store().await else { return };

    let created = store.create_resource(new_resource("c1", "cm1")).await.unwrap();
    store
        .upsert_current_state(
            created.id,
            CurrentStateUpdate {
                spec: Some(json!({"k": "v"})),
                generation: 1,
                revision: 1,
                k8s_resource_version: "41".to_string(),
            },
        )
        .await
        .unwrap();

    let err = store.hard_delete_resource(created.id, "c2").await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));

    store.hard_delete_resource(created.id, "c1").await.unwrap();
    let orphans: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM k_resource_current_states")
            .fetch_one(store.pool())
            .await
            .unwrap();
    assert_eq!(orphans, 0);
}

#[serial]
#[tokio::test]
async fn current_state_upsert_suppresses_equal_resource_versions() {
    let Some(store) = test_store().await else { return };

    let created = store.create_resource(new_resource("c1", "cm1")).await.unwrap();
    let update = CurrentStateUpdate {
        spec: Some(json!({"k": "v"})),
        generation: 1,
        revision: 1,
        k8s_resource_version: "42".to_string(),
    };
    store.upsert_current_state(created.id, update.clone()).await.unwrap();
    let first = store
        .get_resource(created.id)
        .await
        .unwrap()
        .current_state
        .unwrap();

    store.upsert_current_state(created.id, update).await.unwrap();
    let second = store
        .get_resource(created.id)
        .await
        .unwrap()
        .current_state
        .unwrap();
    assert_eq!(first.updated_at, second.updated_at);
}

#[serial]
#[tokio::test]
async fn cluster_registration_is_idempotent() {
    let Some(store) = test_store().await else { return };

    store.register_cluster("c1").await.unwrap();
    store.register_cluster("c1").await.unwrap();
    assert_eq!(store.count_clusters().await.unwrap(), 1);
}

#[serial]
#[tokio::test]
async fn global_resources_track_per_cluster_sync() {
    let Some(store) = test_store().await else { return };

    store.register_cluster("c1").await.unwrap();
    store.register_cluster("c2").await.unwrap();

    let global = store
        .create_global_resource(NewGlobalResource {
            namespace: "default".to_string(),
            kind: "NetworkPolicy".to_string(),
            name: "np1".to_string(),
            api_version: "networking.k8s.io/v1".to_string(),
            desired_spec: json!({"spec": {"policyTypes": ["Ingress"]}}),
            revision: 1,
        })
        .await
        .unwrap();

    assert_eq!(
        store
            .list_out_of_sync_global_resources("c1", 100)
            .await
            .unwrap()
            .len(),
        1
    );
    store.upsert_synced_state(global.id, "c1", 1).await.unwrap();
    store.upsert_synced_state(global.id, "c2", 1).await.unwrap();
    assert!(store
        .list_out_of_sync_global_resources("c1", 100)
        .await
        .unwrap()
        .is_empty());

    let status = store.get_global_resource(global.id).await.unwrap();
    assert_eq!(status.total_clusters, 2);
    assert_eq!(status.synced_clusters, 2);

    // Deleting a global parks it in the deleted queue for every syncer.
    store.soft_delete_global_resource(global.id).await.unwrap();
    assert_eq!(store.list_deleted_global_resources(100).await.unwrap().len(), 1);
    store.delete_synced_state(global.id, "c1").await.unwrap();
    store.delete_synced_state(global.id, "c2").await.unwrap();
}

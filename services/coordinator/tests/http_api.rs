//! End-to-end flows over the HTTP surface with the in-memory store.
mod common;

use axum::http::StatusCode;
use common::{app_with_clusters, auth_request, read_json};
use coordinator::store::{GlobalResourceStore, ResourceStore};
use serde_json::json;
use tower::ServiceExt;
use uuid::Uuid;

#[tokio::test]
async fn create_and_converge() {
    let (app, _store, keys) = app_with_clusters(&["c1"]).await;
    let key = &keys[0];

    // Declare a ConfigMap for cluster c1.
    let response = app
        .clone()
        .oneshot(auth_request(
            "POST",
            "/int/api/v1/resources",
            "c1",
            key,
            Some(json!({
                "namespace": "default",
                "kind": "ConfigMap",
                "name": "cm1",
                "api_version": "v1",
                "desired_spec": {"data": {"k": "v"}},
                "revision": 1,
            })),
        ))
        .await
        .expect("create");
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = read_json(response).await;
    assert_eq!(body["data"]["generation"], 1);
    let id = body["data"]["id"].as_str().expect("id").to_string();

    // The reconciler's first poll sees it.
    let response = app
        .clone()
        .oneshot(auth_request(
            "GET",
            "/int/api/v1/resources/out-of-sync?limit=100",
            "c1",
            key,
            None,
        ))
        .await
        .expect("out-of-sync");
    let body = read_json(response).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["id"], id.as_str());

    // A successful apply records the matching generation...
    let response = app
        .clone()
        .oneshot(auth_request(
            "POST",
            &format!("/int/api/v1/resources/{id}/applied-state"),
            "c1",
            key,
            Some(json!({
                "spec": {"data": {"k": "v"}},
                "generation": 1,
                "revision": 1,
                "status": "success",
                "error_message": null,
            })),
        ))
        .await
        .expect("applied");
    assert_eq!(response.status(), StatusCode::OK);

    // ...and the queue drains.
    let response = app
        .clone()
        .oneshot(auth_request(
            "GET",
            "/int/api/v1/resources/out-of-sync?limit=100",
            "c1",
            key,
            None,
        ))
        .await
        .expect("out-of-sync");
    let body = read_json(response).await;
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn update_bumps_generation_and_requeues() {
    let (app, _store, keys) = app_with_clusters(&["c1"]).await;
    let key = &keys[0];

    let response = app
        .clone()
        .oneshot(auth_request(
            "POST",
            "/int/api/v1/resources",
            "c1",
            key,
            Some(json!({
                "namespace": "default",
                "kind": "ConfigMap",
                "name": "cm1",
                "api_version": "v1",
                "desired_spec": {"data": {"k": "v"}},
                "revision": 1,
            })),
        ))
        .await
        .expect("create");
    let id = read_json(response).await["data"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    // Catch the applied state up to generation 1.
    app.clone()
        .oneshot(auth_request(
            "POST",
            &format!("/int/api/v1/resources/{id}/applied-state"),
            "c1",
            key,
            Some(json!({"spec": {}, "generation": 1, "revision": 1, "status": "success"})),
        ))
        .await
        .expect("applied");

    // Updating the spec moves the generation to 2.
    let response = app
        .clone()
        .oneshot(auth_request(
            "PUT",
            &format!("/int/api/v1/resources/{id}"),
            "c1",
            key,
            Some(json!({"desired_spec": {"data": {"k": "v2"}}, "revision": 1})),
        ))
        .await
        .expect("update");
    let body = read_json(response).await;
    assert_eq!(body["data"]["resource"]["generation"], 2);

    let response = app
        .clone()
        .oneshot(auth_request(
            "GET",
            "/int/api/v1/resources/out-of-sync?limit=100",
            "c1",
            key,
            None,
        ))
        .await
        .expect("out-of-sync");
    let body = read_json(response).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["generation"], 2);
}

#[tokio::test]
async fn soft_delete_handshake_removes_everything() {
    let (app, store, keys) = app_with_clusters(&["c1"]).await;
    let key = &keys[0];

    let response = app
        .clone()
        .oneshot(auth_request(
            "POST",
            "/int/api/v1/resources",
            "c1",
            key,
            Some(json!({
                "namespace": "default",
                "kind": "ConfigMap",
                "name": "cm1",
                "api_version": "v1",
                "desired_spec": {"data": {"k": "v"}},
                "revision": 1,
            })),
        ))
        .await
        .expect("create");
    let id = read_json(response).await["data"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    // Record applied and current state so the cascade has something to do.
    app.clone()
        .oneshot(auth_request(
            "POST",
            &format!("/int/api/v1/resources/{id}/applied-state"),
            "c1",
            key,
            Some(json!({"spec": {}, "generation": 1, "revision": 1, "status": "success"})),
        ))
        .await
        .expect("applied");
    app.clone()
        .oneshot(auth_request(
            "POST",
            &format!("/int/api/v1/resources/{id}/current-state"),
            "c1",
            key,
            Some(json!({"spec": {}, "generation": 1, "revision": 1, "k8s_resource_version": "7"})),
        ))
        .await
        .expect("current");

    // Soft-delete by key; the delete toggle bumps the generation.
    let response = app
        .clone()
        .oneshot(auth_request(
            "DELETE",
            "/int/api/v1/resources/by-key",
            "c1",
            key,
            Some(json!({"namespace": "default", "kind": "ConfigMap", "name": "cm1"})),
        ))
        .await
        .expect("soft delete");
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(auth_request(
            "GET",
            "/int/api/v1/resources/deleted?limit=100",
            "c1",
            key,
            None,
        ))
        .await
        .expect("deleted");
    let body = read_json(response).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["generation"], 2);

    // The reconciler reports the Kubernetes delete done; hard-delete follows.
    let response = app
        .clone()
        .oneshot(auth_request(
            "DELETE",
            &format!("/int/api/v1/resources/{id}"),
            "c1",
            key,
            None,
        ))
        .await
        .expect("hard delete");
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(auth_request(
            "GET",
            "/int/api/v1/resources/deleted?limit=100",
            "c1",
            key,
            None,
        ))
        .await
        .expect("deleted");
    assert!(read_json(response).await["data"].as_array().unwrap().is_empty());

    // State rows cascade with the resource.
    let id = Uuid::parse_str(&id).unwrap();
    assert!(store.get_resource(id).await.is_err());
}

#[tokio::test]
async fn current_state_writes_are_suppressed_for_equal_resource_versions() {
    let (app, store, keys) = app_with_clusters(&["c1"]).await;
    let key = &keys[0];

    let response = app
        .clone()
        .oneshot(auth_request(
            "POST",
            "/int/api/v1/resources",
            "c1",
            key,
            Some(json!({
                "namespace": "default",
                "kind": "ConfigMap",
                "name": "cm1",
                "api_version": "v1",
                "desired_spec": {"data": {"k": "v"}},
                "revision": 1,
            })),
        ))
        .await
        .expect("create");
    let id = read_json(response).await["data"]["id"]
        .as_str()
        .unwrap()
        .to_string();
    let parsed = Uuid::parse_str(&id).unwrap();

    let observation = json!({
        "spec": {"data": {"k": "v"}},
        "generation": 2,
        "revision": 1,
        "k8s_resource_version": "42",
    });
    app.clone()
        .oneshot(auth_request(
            "POST",
            &format!("/int/api/v1/resources/{id}/current-state"),
            "c1",
            key,
            Some(observation.clone()),
        ))
        .await
        .expect("current");
    let first = store
        .get_resource(parsed)
        .await
        .unwrap()
        .current_state
        .unwrap();
    assert_eq!(first.k8s_resource_version, "42");
    assert_eq!(first.generation, 2);

    // The duplicate event writes nothing.
    app.clone()
        .oneshot(auth_request(
            "POST",
            &format!("/int/api/v1/resources/{id}/current-state"),
            "c1",
            key,
            Some(observation),
        ))
        .await
        .expect("duplicate");
    let second = store
        .get_resource(parsed)
        .await
        .unwrap()
        .current_state
        .unwrap();
    assert_eq!(second.updated_at, first.updated_at);

    // DELETE removes the row outright.
    app.clone()
        .oneshot(auth_request(
            "DELETE",
            &format!("/int/api/v1/resources/{id}/current-state"),
            "c1",
            key,
            None,
        ))
        .await
        .expect("delete current");
    assert!(store
        .get_resource(parsed)
        .await
        .unwrap()
        .current_state
        .is_none());
}

#[tokio::test]
async fn global_resources_fan_out_to_every_cluster() {
    let (app, store, keys) = app_with_clusters(&["c1", "c2"]).await;

    let global = store
        .create_global_resource(coordinator::model::NewGlobalResource {
            namespace: "default".to_string(),
            kind: "NetworkPolicy".to_string(),
            name: "np1".to_string(),
            api_version: "networking.k8s.io/v1".to_string(),
            desired_spec: json!({"spec": {"policyTypes": ["Ingress"]}}),
            revision: 1,
        })
        .await
        .expect("create global");

    for (cluster, key) in [("c1", &keys[0]), ("c2", &keys[1])] {
        // Each worker's syncer sees the global in its queue...
        let response = app
            .clone()
            .oneshot(auth_request(
                "GET",
                "/int/api/v1/global-resources/out-of-sync?limit=100",
                cluster,
                key,
                None,
            ))
            .await
            .expect("global out-of-sync");
        let body = read_json(response).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
        assert_eq!(body["data"][0]["id"], global.id.to_string());

        // ...materializes it as its own resource...
        let response = app
            .clone()
            .oneshot(auth_request(
                "POST",
                "/int/api/v1/resources",
                cluster,
                key,
                Some(json!({
                    "namespace": "default",
                    "kind": "NetworkPolicy",
                    "name": "np1",
                    "api_version": "networking.k8s.io/v1",
                    "desired_spec": {"spec": {"policyTypes": ["Ingress"]}},
                    "revision": 1,
                })),
            ))
            .await
            .expect("materialize");
        assert_eq!(response.status(), StatusCode::CREATED);

        // ...and records the reached generation.
        let response = app
            .clone()
            .oneshot(auth_request(
                "POST",
                &format!("/int/api/v1/global-resources/{}/synced-state", global.id),
                cluster,
                key,
                Some(json!({"synced_generation": 1})),
            ))
            .await
            .expect("synced");
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .clone()
            .oneshot(auth_request(
                "GET",
                "/int/api/v1/global-resources/out-of-sync?limit=100",
                cluster,
                key,
                None,
            ))
            .await
            .expect("global out-of-sync");
        assert!(read_json(response).await["data"].as_array().unwrap().is_empty());
    }

    let status = store.get_global_resource(global.id).await.expect("status");
    assert_eq!(status.total_clusters, 2);
    assert_eq!(status.synced_clusters, 2);
    assert!(status.clusters.iter().all(|c| c.is_synced));
}

#[tokio::test]
async fn materializing_over_a_user_resource_takes_the_same_row() {
    let (app, _store, keys) = app_with_clusters(&["c1"]).await;
    let key = &keys[0];

    // A user declared this key directly in c1.
    let response = app
        .clone()
        .oneshot(auth_request(
            "POST",
            "/int/api/v1/resources",
            "c1",
            key,
            Some(json!({
                "namespace": "default",
                "kind": "NetworkPolicy",
                "name": "np1",
                "api_version": "networking.k8s.io/v1",
                "desired_spec": {"spec": {"user": true}},
                "revision": 1,
            })),
        ))
        .await
        .expect("user create");
    let user_id = read_json(response).await["data"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    // The global syncer materializes the same key: the global's spec wins and
    // no second row appears.
    let response = app
        .clone()
        .oneshot(auth_request(
            "POST",
            "/int/api/v1/resources",
            "c1",
            key,
            Some(json!({
                "namespace": "default",
                "kind": "NetworkPolicy",
                "name": "np1",
                "api_version": "networking.k8s.io/v1",
                "desired_spec": {"spec": {"global": true}},
                "revision": 2,
            })),
        ))
        .await
        .expect("global materialize");
    let body = read_json(response).await;
    assert_eq!(body["data"]["id"], user_id.as_str());
    assert_eq!(body["data"]["desired_spec"]["spec"]["global"], true);
    assert_eq!(body["data"]["generation"], 2);

    let response = app
        .clone()
        .oneshot(auth_request("GET", "/int/api/v1/resources", "c1", key, None))
        .await
        .expect("list");
    assert_eq!(read_json(response).await["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn foreign_resources_answer_not_found() {
    let (app, _store, keys) = app_with_clusters(&["c1", "c2"]).await;

    let response = app
        .clone()
        .oneshot(auth_request(
            "POST",
            "/int/api/v1/resources",
            "c1",
            &keys[0],
            Some(json!({
                "namespace": "default",
                "kind": "ConfigMap",
                "name": "cm1",
                "api_version": "v1",
                "desired_spec": {"data": {}},
                "revision": 1,
            })),
        ))
        .await
        .expect("create");
    let id = read_json(response).await["data"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    // c2 cannot read, hard-delete, or post state for c1's resource.
    for request in [
        auth_request(
            "GET",
            &format!("/int/api/v1/resources/{id}"),
            "c2",
            &keys[1],
            None,
        ),
        auth_request(
            "DELETE",
            &format!("/int/api/v1/resources/{id}"),
            "c2",
            &keys[1],
            None,
        ),
        auth_request(
            "POST",
            &format!("/int/api/v1/resources/{id}/applied-state"),
            "c2",
            &keys[1],
            Some(json!({"spec": {}, "generation": 1, "revision": 1, "status": "success"})),
        ),
    ] {
        let response = app.clone().oneshot(request).await.expect("request");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}

#[tokio::test]
async fn malformed_ids_and_bodies_are_rejected() {
    let (app, _store, keys) = app_with_clusters(&["c1"]).await;
    let key = &keys[0];

    let response = app
        .clone()
        .oneshot(auth_request(
            "DELETE",
            "/int/api/v1/resources/not-a-uuid",
            "c1",
            key,
            None,
        ))
        .await
        .expect("bad id");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(read_json(response).await["error"], "invalid resource id");

    let response = app
        .clone()
        .oneshot(auth_request(
            "POST",
            "/int/api/v1/resources",
            "c1",
            key,
            Some(json!({"namespace": "default"})),
        ))
        .await
        .expect("bad body");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(read_json(response).await["error"], "invalid request body");
}

//! Client behavior against a stub coordinator.
use axum::extract::Request;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use kontrol_client::types::{AppliedStatus, UpsertAppliedStateRequest};
use kontrol_client::{ApiClient, ClientError};
use serde_json::json;

/// Serve a router on an ephemeral port and return its base URL.
async fn spawn_server(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn requests_carry_auth_headers() {
    let router = Router::new().route(
        "/int/api/v1/resources/out-of-sync",
        get(|request: Request| async move {
            let headers = request.headers();
            assert_eq!(headers.get("x-api-key").unwrap(), "kontrol_secret");
            assert_eq!(headers.get("x-cluster-id").unwrap(), "c1");
            Json(json!({"data": []}))
        }),
    );
    let base_url = spawn_server(router).await;

    let client = ApiClient::new(&base_url, "kontrol_secret", "c1").expect("client");
    let resources = client.list_out_of_sync_resources(100).await.expect("list");
    assert!(resources.is_empty());
}

#[tokio::test]
async fn error_bodies_become_api_errors() {
    let router = Router::new().route(
        "/int/api/v1/cluster/register",
        post(|| async {
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": "invalid api key"})),
            )
        }),
    );
    let base_url = spawn_server(router).await;

    let client = ApiClient::new(&base_url, "kontrol_wrong", "c1").expect("client");
    let err = client.register_cluster().await.expect_err("must fail");
    match err {
        ClientError::Api { status, message } => {
            assert_eq!(status.as_u16(), StatusCode::UNAUTHORIZED.as_u16());
            assert_eq!(message, "invalid api key");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn applied_state_error_reports_omit_generation() {
    let router = Router::new().route(
        "/int/api/v1/resources/:id/applied-state",
        post(|Json(body): Json<serde_json::Value>| async move {
            // Error reports must not carry generation/revision keys at all,
            // so the coordinator keeps the stored values.
            assert!(body.get("generation").is_none());
            assert!(body.get("revision").is_none());
            assert_eq!(body["status"], "error");
            assert_eq!(body["error_message"], "apply failed");
            Json(json!({"success": true}))
        }),
    );
    let base_url = spawn_server(router).await;

    let client = ApiClient::new(&base_url, "kontrol_secret", "c1").expect("client");
    client
        .upsert_applied_state(
            uuid::Uuid::now_v7(),
            &UpsertAppliedStateRequest {
                spec: None,
                generation: None,
                revision: None,
                status: AppliedStatus::Error,
                error_message: Some("apply failed".to_string()),
            },
        )
        .await
        .expect("upsert");
}

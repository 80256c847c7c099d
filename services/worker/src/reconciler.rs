//! Reconciler loop: drives desired state into the cluster.
//!
//! # Purpose
//! Polls the coordinator for out-of-sync resources, applies each to
//! Kubernetes with server-side apply, and records the outcome as applied
//! state. Soft-deleted resources are removed from the cluster and then
//! hard-deleted at the coordinator (two-phase delete).
//!
//! # Key invariants
//! - Every applied object carries the correlation annotations; the watcher
//!   depends on them to map live objects back to resources.
//! - A failed apply records `status=error` without advancing the applied
//!   generation, so the resource stays queued and the next poll retries.
//! - Resources are processed sequentially within one poll; a retry surge
//!   cannot dogpile the coordinator.
use crate::k8s::{self, ANNOTATION_GENERATION, ANNOTATION_RESOURCE_ID, ANNOTATION_REVISION, FIELD_MANAGER};
use anyhow::{bail, Result};
use kontrol_client::types::{AppliedStatus, Resource, UpsertAppliedStateRequest};
use kontrol_client::ApiClient;
use kube::api::{Api, DeleteParams, Patch, PatchParams};
use kube::core::{ApiResource, DynamicObject};
use kube::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const POLL_INTERVAL: Duration = Duration::from_secs(10);
const BATCH_LIMIT: i64 = 100;

pub struct Reconciler {
    api: ApiClient,
    kube: Client,
    cluster_id: String,
}

/// Assemble the Kubernetes object to apply: the desired spec overlaid with
/// the authoritative identity fields and the correlation annotations.
pub(crate) fn build_desired_object(resource: &Resource) -> Result<Value> {
    let Value::Object(mut object) = resource.desired_spec.clone() else {
        bail!("desired_spec must be a JSON object");
    };
    object.insert(
        "apiVersion".to_string(),
        Value::String(resource.api_version.clone()),
    );
    object.insert("kind".to_string(), Value::String(resource.kind.clone()));

    let metadata = object
        .entry("metadata".to_string())
        .or_insert_with(|| json!({}));
    let Some(metadata) = metadata.as_object_mut() else {
        bail!("metadata must be a JSON object");
    };
    metadata.insert("name".to_string(), Value::String(resource.name.clone()));
    if !resource.namespace.is_empty() {
        metadata.insert(
            "namespace".to_string(),
            Value::String(resource.namespace.clone()),
        );
    }

    let annotations = metadata
        .entry("annotations".to_string())
        .or_insert_with(|| json!({}));
    let Some(annotations) = annotations.as_object_mut() else {
        bail!("metadata.annotations must be a JSON object");
    };
    annotations.insert(
        ANNOTATION_RESOURCE_ID.to_string(),
        Value::String(resource.id.to_string()),
    );
    annotations.insert(
        ANNOTATION_GENERATION.to_string(),
        Value::String(resource.generation.to_string()),
    );
    annotations.insert(
        ANNOTATION_REVISION.to_string(),
        Value::String(resource.revision.to_string()),
    );

    Ok(Value::Object(object))
}

impl Reconciler {
    pub fn new(api: ApiClient, kube: Client) -> Self {
        let cluster_id = api.cluster_id().to_string();
        Self {
            api,
            kube,
            cluster_id,
        }
    }

    pub async fn run(self, cancel: CancellationToken) {
        info!(cluster_id = %self.cluster_id, "reconciler started");
        loop {
            self.poll_once().await;
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("reconciler stopped");
                    return;
                }
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
            }
        }
    }

    async fn poll_once(&self) {
        match self.api.list_out_of_sync_resources(BATCH_LIMIT).await {
            Ok(resources) => {
                for resource in resources {
                    if resource.cluster_id != self.cluster_id {
                        warn!(
                            resource_id = %resource.id,
                            owner = %resource.cluster_id,
                            "refusing to reconcile resource owned by another cluster"
                        );
                        continue;
                    }
                    if let Err(err) = self.reconcile_one(&resource).await {
                        warn!(resource_id = %resource.id, error = %err, "reconcile failed");
                    }
                }
            }
            Err(err) => warn!(error = %err, "failed to list out-of-sync resources"),
        }

        match self.api.list_deleted_resources(BATCH_LIMIT).await {
            Ok(resources) => {
                for resource in resources {
                    if resource.cluster_id != self.cluster_id {
                        warn!(
                            resource_id = %resource.id,
                            owner = %resource.cluster_id,
                            "refusing to delete resource owned by another cluster"
                        );
                        continue;
                    }
                    if let Err(err) = self.delete_one(&resource).await {
                        warn!(resource_id = %resource.id, error = %err, "delete failed");
                    }
                }
            }
            Err(err) => warn!(error = %err, "failed to list deleted resources"),
        }
    }

    async fn reconcile_one(&self, resource: &Resource) -> Result<()> {
        info!(
            resource_id = %resource.id,
            kind = %resource.kind,
            generation = resource.generation,
            revision = resource.revision,
            "applying resource"
        );

        let desired = match build_desired_object(resource) {
            Ok(desired) => desired,
            Err(err) => {
                // A malformed spec cannot converge on its own; record the
                // error and wait for the user to fix the spec.
                self.report_apply_error(resource, err.to_string()).await?;
                return Ok(());
            }
        };

        let api_resource = k8s::api_resource_for(&resource.kind, &resource.api_version);
        let api = self.dynamic_api(&api_resource, &resource.namespace);
        let params = PatchParams::apply(FIELD_MANAGER).force();

        match api
            .patch(&resource.name, &params, &Patch::Apply(&desired))
            .await
        {
            Ok(_) => {
                self.api
                    .upsert_applied_state(
                        resource.id,
                        &UpsertAppliedStateRequest {
                            spec: Some(desired),
                            generation: Some(resource.generation),
                            revision: Some(resource.revision),
                            status: AppliedStatus::Success,
                            error_message: None,
                        },
                    )
                    .await?;
                info!(
                    resource_id = %resource.id,
                    generation = resource.generation,
                    "resource applied"
                );
            }
            Err(err) => {
                warn!(resource_id = %resource.id, error = %err, "server-side apply failed");
                self.report_apply_error(resource, err.to_string()).await?;
            }
        }
        Ok(())
    }

    async fn report_apply_error(&self, resource: &Resource, message: String) -> Result<()> {
        // Generation and revision stay unset: the applied row keeps its old
        // values and the resource remains out of sync.
        self.api
            .upsert_applied_state(
                resource.id,
                &UpsertAppliedStateRequest {
                    spec: None,
                    generation: None,
                    revision: None,
                    status: AppliedStatus::Error,
                    error_message: Some(message),
                },
            )
            .await?;
        Ok(())
    }

    async fn delete_one(&self, resource: &Resource) -> Result<()> {
        let api_resource = k8s::api_resource_for(&resource.kind, &resource.api_version);
        let api = self.dynamic_api(&api_resource, &resource.namespace);

        match api.delete(&resource.name, &DeleteParams::default()).await {
            Ok(_) => {}
            // Already gone from the cluster counts as a successful delete.
            Err(kube::Error::Api(response)) if response.code == 404 => {}
            Err(err) => return Err(err.into()),
        }

        // Only after Kubernetes confirmed the object is gone does the row
        // get removed; a crash in between leaves the soft-deleted row for
        // the next poll to retry.
        self.api.hard_delete_resource(resource.id).await?;
        info!(resource_id = %resource.id, "resource deleted");
        Ok(())
    }

    fn dynamic_api(&self, api_resource: &ApiResource, namespace: &str) -> Api<DynamicObject> {
        if namespace.is_empty() {
            Api::all_with(self.kube.clone(), api_resource)
        } else {
            Api::namespaced_with(self.kube.clone(), namespace, api_resource)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn resource(desired_spec: Value) -> Resource {
        Resource {
            id: Uuid::now_v7(),
            cluster_id: "c1".to_string(),
            namespace: "default".to_string(),
            kind: "ConfigMap".to_string(),
            name: "cm1".to_string(),
            api_version: "v1".to_string(),
            desired_spec,
            generation: 3,
            revision: 2,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        }
    }

    #[test]
    fn desired_object_carries_identity_and_annotations() {
        let resource = resource(json!({"data": {"k": "v"}}));
        let object = build_desired_object(&resource).unwrap();

        assert_eq!(object["apiVersion"], "v1");
        assert_eq!(object["kind"], "ConfigMap");
        assert_eq!(object["metadata"]["name"], "cm1");
        assert_eq!(object["metadata"]["namespace"], "default");
        assert_eq!(object["data"]["k"], "v");

        let annotations = &object["metadata"]["annotations"];
        assert_eq!(
            annotations[ANNOTATION_RESOURCE_ID],
            resource.id.to_string()
        );
        assert_eq!(annotations[ANNOTATION_GENERATION], "3");
        assert_eq!(annotations[ANNOTATION_REVISION], "2");
    }

    #[test]
    fn desired_object_overrides_spec_identity_fields() {
        // Whatever the spec claims about its identity, the resource row wins.
        let resource = resource(json!({
            "kind": "Secret",
            "metadata": {"name": "other", "labels": {"app": "web"}},
        }));
        let object = build_desired_object(&resource).unwrap();

        assert_eq!(object["kind"], "ConfigMap");
        assert_eq!(object["metadata"]["name"], "cm1");
        // Untouched metadata survives the overlay.
        assert_eq!(object["metadata"]["labels"]["app"], "web");
    }

    #[test]
    fn cluster_scoped_resources_omit_namespace() {
        let mut r = resource(json!({"spec": {}}));
        r.namespace = String::new();
        r.kind = "Namespace".to_string();
        let object = build_desired_object(&r).unwrap();
        assert!(object["metadata"].get("namespace").is_none());
    }

    #[test]
    fn existing_annotations_are_preserved() {
        let resource = resource(json!({
            "metadata": {"annotations": {"team": "platform"}},
            "data": {},
        }));
        let object = build_desired_object(&resource).unwrap();
        let annotations = &object["metadata"]["annotations"];
        assert_eq!(annotations["team"], "platform");
        assert_eq!(annotations[ANNOTATION_GENERATION], "3");
    }

    #[test]
    fn non_object_specs_are_rejected() {
        assert!(build_desired_object(&resource(json!("not-an-object"))).is_err());
        assert!(build_desired_object(&resource(json!({"metadata": 7}))).is_err());
    }
}

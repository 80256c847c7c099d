//! Watcher loop: mirrors live cluster state back to the coordinator.
//!
//! # Purpose
//! One watch task per supported kind, each subscribed cluster-wide. Events
//! are correlated to resources through the `kontrol/*` annotations; objects
//! without them belong to someone else and are ignored, which makes a
//! cluster-wide watch safe and cheap. Correlated ADDED/MODIFIED events upsert
//! current state, DELETED events drop it.
//!
//! # Failure behavior
//! A broken watch stream sleeps five seconds and reconnects; no state is
//! lost because the coordinator's current-state upsert is idempotent over
//! `metadata.resourceVersion`.
use crate::k8s::{
    KindMapping, ANNOTATION_GENERATION, ANNOTATION_RESOURCE_ID, ANNOTATION_REVISION,
};
use futures::{pin_mut, TryStreamExt};
use kontrol_client::types::UpsertCurrentStateRequest;
use kontrol_client::{ApiClient, ClientError};
use kube::api::Api;
use kube::core::DynamicObject;
use kube::runtime::watcher::{watcher, Config as WatcherConfig, Event};
use kube::Client;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// The coordinator answers 404 when the resource row is already gone, which
/// is routine while a delete handshake is in flight.
fn is_not_found(err: &ClientError) -> bool {
    matches!(err, ClientError::Api { status, .. } if status.as_u16() == 404)
}

pub struct Watcher {
    api: ApiClient,
    kube: Client,
    kinds: Vec<&'static KindMapping>,
}

/// What a live object tells us about the resource it was applied from.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct Correlation {
    pub resource_id: Uuid,
    pub generation: i32,
    pub revision: i32,
    pub resource_version: String,
}

/// Resource id from the correlation annotation; `None` means the object is
/// not managed by this control plane.
pub(crate) fn managed_resource_id(object: &DynamicObject) -> Option<Uuid> {
    object
        .metadata
        .annotations
        .as_ref()?
        .get(ANNOTATION_RESOURCE_ID)?
        .parse()
        .ok()
}

/// Full correlation for state upserts. The generation annotation is
/// mandatory; a missing revision parses as zero, matching what old applies
/// stamped.
pub(crate) fn correlate(object: &DynamicObject) -> Option<Correlation> {
    let resource_id = managed_resource_id(object)?;
    let annotations = object.metadata.annotations.as_ref()?;
    let generation = annotations.get(ANNOTATION_GENERATION)?.parse().ok()?;
    let revision = annotations
        .get(ANNOTATION_REVISION)
        .and_then(|value| value.parse().ok())
        .unwrap_or(0);
    let resource_version = object.metadata.resource_version.clone()?;
    Some(Correlation {
        resource_id,
        generation,
        revision,
        resource_version,
    })
}

impl Watcher {
    pub fn new(api: ApiClient, kube: Client, kinds: Vec<&'static KindMapping>) -> Self {
        Self { api, kube, kinds }
    }

    pub async fn run(self, cancel: CancellationToken) {
        info!(kinds = self.kinds.len(), "watcher started");
        let mut tasks = JoinSet::new();
        for mapping in self.kinds {
            let api = self.api.clone();
            let kube = self.kube.clone();
            let cancel = cancel.clone();
            tasks.spawn(watch_kind(api, kube, mapping, cancel));
        }
        while tasks.join_next().await.is_some() {}
        info!("all watches stopped");
    }
}

async fn watch_kind(
    api: ApiClient,
    kube: Client,
    mapping: &'static KindMapping,
    cancel: CancellationToken,
) {
    let api_resource = mapping.api_resource();
    info!(resource = mapping.plural, "watch started");

    loop {
        let watch_api: Api<DynamicObject> = Api::all_with(kube.clone(), &api_resource);
        let stream = watcher(watch_api, WatcherConfig::default());
        pin_mut!(stream);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(resource = mapping.plural, "watch stopped");
                    return;
                }
                event = stream.try_next() => match event {
                    Ok(Some(event)) => handle_event(&api, event).await,
                    Ok(None) => break,
                    Err(err) => {
                        warn!(resource = mapping.plural, error = %err, "watch stream error");
                        break;
                    }
                }
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                info!(resource = mapping.plural, "watch stopped");
                return;
            }
            _ = tokio::time::sleep(RECONNECT_DELAY) => {
                debug!(resource = mapping.plural, "reconnecting watch");
            }
        }
    }
}

async fn handle_event(api: &ApiClient, event: Event<DynamicObject>) {
    match event {
        Event::Applied(object) => handle_applied(api, &object).await,
        Event::Deleted(object) => handle_deleted(api, &object).await,
        Event::Restarted(objects) => {
            // A restarted watch replays the full set; re-upserting is safe
            // because equal resource versions are suppressed server-side.
            for object in &objects {
                handle_applied(api, object).await;
            }
        }
    }
}

async fn handle_applied(api: &ApiClient, object: &DynamicObject) {
    let Some(correlation) = correlate(object) else {
        return;
    };

    let request = UpsertCurrentStateRequest {
        spec: object.data.get("spec").cloned(),
        generation: correlation.generation,
        revision: correlation.revision,
        k8s_resource_version: correlation.resource_version,
    };

    match api.upsert_current_state(correlation.resource_id, &request).await {
        Ok(()) => debug!(
            resource_id = %correlation.resource_id,
            generation = correlation.generation,
            "current state recorded"
        ),
        Err(err) if is_not_found(&err) => debug!(
            resource_id = %correlation.resource_id,
            "resource row already gone; skipping current state"
        ),
        Err(err) => warn!(
            resource_id = %correlation.resource_id,
            error = %err,
            "failed to record current state"
        ),
    }
}

async fn handle_deleted(api: &ApiClient, object: &DynamicObject) {
    let Some(resource_id) = managed_resource_id(object) else {
        return;
    };

    match api.delete_current_state(resource_id).await {
        Ok(()) => info!(resource_id = %resource_id, "current state removed"),
        Err(err) if is_not_found(&err) => {
            debug!(resource_id = %resource_id, "resource row already gone")
        }
        Err(err) => warn!(
            resource_id = %resource_id,
            error = %err,
            "failed to remove current state"
        ),
    }
}

//! Kubernetes client bootstrap and kind-to-resource mapping.
//!
//! # Purpose
//! Builds the dynamic client the loops share and maps the kinds the control
//! plane manages onto `ApiResource`s for the dynamic API. The mapping is a
//! static table; unknown kinds fall through to a best-effort entry that uses
//! the kind itself as the resource name.
use anyhow::{Context, Result};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::core::ApiResource;
use kube::{Client, Config};

/// Field manager name for server-side apply; the API server tracks field
/// ownership under this identity.
pub const FIELD_MANAGER: &str = "kontrol";

/// Correlation annotations stamped onto every applied object. The watcher
/// uses them to map live objects back to coordinator resources.
pub const ANNOTATION_RESOURCE_ID: &str = "kontrol/resource-id";
pub const ANNOTATION_GENERATION: &str = "kontrol/generation";
pub const ANNOTATION_REVISION: &str = "kontrol/revision";

/// One supported kind: `(kind, group, version, plural, alias)`.
/// The alias is what `KONTROL_SUPPORTED_GVRS` entries are matched against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindMapping {
    pub kind: &'static str,
    pub group: &'static str,
    pub version: &'static str,
    pub plural: &'static str,
}

/// The kinds the worker knows how to watch. Applies still work for anything
/// else through the fallback mapping.
pub const KNOWN_KINDS: &[KindMapping] = &[
    KindMapping { kind: "Deployment", group: "apps", version: "v1", plural: "deployments" },
    KindMapping { kind: "StatefulSet", group: "apps", version: "v1", plural: "statefulsets" },
    KindMapping { kind: "DaemonSet", group: "apps", version: "v1", plural: "daemonsets" },
    KindMapping { kind: "ReplicaSet", group: "apps", version: "v1", plural: "replicasets" },
    KindMapping { kind: "Service", group: "", version: "v1", plural: "services" },
    KindMapping { kind: "ConfigMap", group: "", version: "v1", plural: "configmaps" },
    KindMapping { kind: "Secret", group: "", version: "v1", plural: "secrets" },
    KindMapping { kind: "Pod", group: "", version: "v1", plural: "pods" },
    KindMapping { kind: "Namespace", group: "", version: "v1", plural: "namespaces" },
    KindMapping { kind: "Ingress", group: "networking.k8s.io", version: "v1", plural: "ingresses" },
    KindMapping { kind: "NetworkPolicy", group: "networking.k8s.io", version: "v1", plural: "networkpolicies" },
    KindMapping { kind: "Job", group: "batch", version: "v1", plural: "jobs" },
    KindMapping { kind: "CronJob", group: "batch", version: "v1", plural: "cronjobs" },
];

impl KindMapping {
    pub fn api_resource(&self) -> ApiResource {
        let api_version = if self.group.is_empty() {
            self.version.to_string()
        } else {
            format!("{}/{}", self.group, self.version)
        };
        ApiResource {
            group: self.group.to_string(),
            version: self.version.to_string(),
            api_version,
            kind: self.kind.to_string(),
            plural: self.plural.to_string(),
        }
    }
}

/// Resolve the dynamic-API coordinates for a kind. Known kinds come from the
/// static table; anything else uses the declared `api_version` with the kind
/// doubling as the resource name.
pub fn api_resource_for(kind: &str, api_version: &str) -> ApiResource {
    if let Some(mapping) = KNOWN_KINDS.iter().find(|m| m.kind == kind) {
        return mapping.api_resource();
    }

    let (group, version) = match api_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), api_version.to_string()),
    };
    ApiResource {
        group,
        version,
        api_version: api_version.to_string(),
        kind: kind.to_string(),
        plural: kind.to_string(),
    }
}

/// Select which kinds to watch from a comma-separated, case-insensitive
/// filter (`deployment,networkpolicy`). Empty means all known kinds; entries
/// that match nothing are logged and skipped.
pub fn supported_kinds(filter: &str) -> Vec<&'static KindMapping> {
    let filter = filter.trim();
    if filter.is_empty() {
        return KNOWN_KINDS.iter().collect();
    }

    let mut selected = Vec::new();
    for token in filter.split(',') {
        let token = token.trim().to_ascii_lowercase();
        if token.is_empty() {
            continue;
        }
        match KNOWN_KINDS
            .iter()
            .find(|m| m.kind.to_ascii_lowercase() == token || m.plural == token)
        {
            Some(mapping) if !selected.contains(&mapping) => selected.push(mapping),
            Some(_) => {}
            None => tracing::warn!(kind = %token, "ignoring unknown kind in KONTROL_SUPPORTED_GVRS"),
        }
    }
    selected
}

/// Build a Kubernetes client from a kubeconfig path, or from the in-cluster
/// service account when no path is configured.
pub async fn build_client(kubeconfig: Option<&str>) -> Result<Client> {
    let config = match kubeconfig.filter(|path| !path.is_empty()) {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path)
                .with_context(|| format!("read kubeconfig {path}"))?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .context("build config from kubeconfig")?
        }
        None => Config::incluster().context("build in-cluster config")?,
    };
    Client::try_from(config).context("build kubernetes client")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_kinds_map_to_their_gvr() {
        let deployment = api_resource_for("Deployment", "apps/v1");
        assert_eq!(deployment.group, "apps");
        assert_eq!(deployment.plural, "deployments");

        let service = api_resource_for("Service", "v1");
        assert_eq!(service.group, "");
        assert_eq!(service.api_version, "v1");
        assert_eq!(service.plural, "services");

        let policy = api_resource_for("NetworkPolicy", "networking.k8s.io/v1");
        assert_eq!(policy.group, "networking.k8s.io");
        assert_eq!(policy.plural, "networkpolicies");
    }

    #[test]
    fn unknown_kinds_fall_back_to_kind_as_resource() {
        let custom = api_resource_for("Widget", "example.com/v1alpha1");
        assert_eq!(custom.group, "example.com");
        assert_eq!(custom.version, "v1alpha1");
        assert_eq!(custom.plural, "Widget");

        let core_custom = api_resource_for("Gadget", "v2");
        assert_eq!(core_custom.group, "");
        assert_eq!(core_custom.version, "v2");
    }

    #[test]
    fn empty_filter_selects_everything() {
        assert_eq!(supported_kinds("").len(), KNOWN_KINDS.len());
        assert_eq!(supported_kinds("  ").len(), KNOWN_KINDS.len());
    }

    #[test]
    fn filter_matches_aliases_case_insensitively() {
        let kinds = supported_kinds("Deployment,networkpolicy, SERVICE");
        let names: Vec<&str> = kinds.iter().map(|m| m.kind).collect();
        assert_eq!(names, vec!["Deployment", "NetworkPolicy", "Service"]);
    }

    #[test]
    fn filter_skips_unknown_and_duplicate_entries() {
        let kinds = supported_kinds("deployment,deployment,flux-capacitor");
        assert_eq!(kinds.len(), 1);
        assert_eq!(kinds[0].kind, "Deployment");
    }
}

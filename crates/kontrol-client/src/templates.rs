//! Resource templates: pure builders for desired specs.
//!
//! A template turns a handful of typed inputs into the `(kind, api_version,
//! namespace, name, spec)` tuple a resource is declared with, and can
//! decompile a stored spec back into its fields. Templates hold no state
//! beyond their inputs and perform no I/O.
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template {template}: missing or invalid field {field}")]
    InvalidSpec {
        template: &'static str,
        field: &'static str,
    },
}

/// Everything needed to declare a resource from a template.
#[derive(Debug, Clone)]
pub struct TemplateOutput {
    pub kind: String,
    pub api_version: String,
    pub namespace: String,
    pub name: String,
    pub spec: Value,
}

pub trait Template {
    fn template_name(&self) -> &'static str;

    fn build(&self) -> Result<TemplateOutput, TemplateError>;

    /// Populate the template's fields from a stored spec.
    fn decompile(&mut self, spec: &Value) -> Result<(), TemplateError>;
}

/// Ingress-allowlist NetworkPolicy: selects pods by label and admits traffic
/// from the given pod selectors; egress is left open.
#[derive(Debug, Clone, Default)]
pub struct NetworkPolicyTemplate {
    pub namespace: String,
    pub name: String,
    pub pod_labels: BTreeMap<String, String>,
    pub allow_from: Vec<BTreeMap<String, String>>,
}

impl Template for NetworkPolicyTemplate {
    fn template_name(&self) -> &'static str {
        "network-policy"
    }

    fn build(&self) -> Result<TemplateOutput, TemplateError> {
        let ingress_from: Vec<Value> = self
            .allow_from
            .iter()
            .map(|labels| json!({"podSelector": {"matchLabels": labels}}))
            .collect();

        let spec = json!({
            "spec": {
                "podSelector": {"matchLabels": self.pod_labels},
                "policyTypes": ["Ingress"],
                "ingress": [{"from": ingress_from}],
                "egress": [{}],
            }
        });

        Ok(TemplateOutput {
            kind: "NetworkPolicy".to_string(),
            api_version: "networking.k8s.io/v1".to_string(),
            namespace: self.namespace.clone(),
            name: self.name.clone(),
            spec,
        })
    }

    fn decompile(&mut self, spec: &Value) -> Result<(), TemplateError> {
        let name = self.template_name();
        let invalid = |field: &'static str| TemplateError::InvalidSpec {
            template: name,
            field,
        };

        let spec_map = spec
            .get("spec")
            .and_then(Value::as_object)
            .ok_or_else(|| invalid("spec"))?;
        let match_labels = spec_map
            .get("podSelector")
            .and_then(|s| s.get("matchLabels"))
            .and_then(Value::as_object)
            .ok_or_else(|| invalid("spec.podSelector.matchLabels"))?;
        self.pod_labels = string_map(match_labels);

        // Ingress rules are optional in a stored policy; take the first
        // rule's `from` selectors when present.
        self.allow_from.clear();
        if let Some(from) = spec_map
            .get("ingress")
            .and_then(Value::as_array)
            .and_then(|rules| rules.first())
            .and_then(|rule| rule.get("from"))
            .and_then(Value::as_array)
        {
            for peer in from {
                if let Some(labels) = peer
                    .get("podSelector")
                    .and_then(|s| s.get("matchLabels"))
                    .and_then(Value::as_object)
                {
                    self.allow_from.push(string_map(labels));
                }
            }
        }

        Ok(())
    }
}

fn string_map(map: &Map<String, Value>) -> BTreeMap<String, String> {
    map.iter()
        .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn build_produces_ingress_allowlist() {
        let template = NetworkPolicyTemplate {
            namespace: "default".to_string(),
            name: "allow-web".to_string(),
            pod_labels: labels(&[("app", "db")]),
            allow_from: vec![labels(&[("app", "web")])],
        };

        let output = template.build().unwrap();
        assert_eq!(output.kind, "NetworkPolicy");
        assert_eq!(output.api_version, "networking.k8s.io/v1");
        assert_eq!(
            output.spec["spec"]["podSelector"]["matchLabels"]["app"],
            "db"
        );
        assert_eq!(
            output.spec["spec"]["ingress"][0]["from"][0]["podSelector"]["matchLabels"]["app"],
            "web"
        );
        assert_eq!(output.spec["spec"]["policyTypes"][0], "Ingress");
    }

    #[test]
    fn decompile_recovers_fields_from_built_spec() {
        let template = NetworkPolicyTemplate {
            namespace: "default".to_string(),
            name: "allow-web".to_string(),
            pod_labels: labels(&[("app", "db"), ("tier", "storage")]),
            allow_from: vec![labels(&[("app", "web")]), labels(&[("app", "api")])],
        };
        let output = template.build().unwrap();

        let mut recovered = NetworkPolicyTemplate::default();
        recovered.decompile(&output.spec).unwrap();
        assert_eq!(recovered.pod_labels, template.pod_labels);
        assert_eq!(recovered.allow_from, template.allow_from);
    }

    #[test]
    fn decompile_rejects_specs_without_pod_selector() {
        let mut template = NetworkPolicyTemplate::default();
        let err = template
            .decompile(&serde_json::json!({"spec": {"policyTypes": ["Ingress"]}}))
            .unwrap_err();
        assert!(matches!(err, TemplateError::InvalidSpec { .. }));
    }
}

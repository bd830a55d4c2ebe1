//! ClusterInstance descriptor rendering.
//!
//! The descriptor wraps the merged cluster document in a ClusterInstance
//! object named after the cluster. Structural checks catch documents the
//! install backend would accept but could never render.

use crate::error::StageError;
use crds::PROVISIONING_REQUEST_NAME_LABEL;
use serde_json::{json, Value};

pub const CLUSTER_INSTANCE_API_VERSION: &str = "siteconfig.open-cluster-management.io/v1alpha1";
pub const CLUSTER_INSTANCE_KIND: &str = "ClusterInstance";

/// Install manifests suppressed once an upgrade changes the image set
pub const UPGRADE_SUPPRESSED_MANIFESTS: [&str; 1] = ["AgentClusterInstall"];

/// Builds the ClusterInstance object for `cluster_name` from the merged document.
pub fn render(cluster_name: &str, request_name: &str, spec: Value) -> Value {
    json!({
        "apiVersion": CLUSTER_INSTANCE_API_VERSION,
        "kind": CLUSTER_INSTANCE_KIND,
        "metadata": {
            "name": cluster_name,
            "namespace": cluster_name,
            "labels": { PROVISIONING_REQUEST_NAME_LABEL: request_name },
        },
        "spec": spec,
    })
}

/// Checks the fields every ClusterInstance needs before it can be applied.
pub fn validate(descriptor: &Value) -> Result<(), StageError> {
    let spec = descriptor
        .get("spec")
        .filter(|s| s.is_object())
        .ok_or_else(|| StageError::input("spec must be a mapping"))?;

    if !non_empty_string(spec.get("clusterName")) {
        return Err(StageError::input("spec.clusterName must be provided"));
    }
    if !non_empty_list(spec.get("templateRefs")) {
        return Err(StageError::input("spec.templateRefs must be provided"));
    }
    let nodes = spec
        .get("nodes")
        .and_then(Value::as_array)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| StageError::input("spec.nodes must be provided"))?;

    for (index, node) in nodes.iter().enumerate() {
        if !non_empty_string(node.get("hostName")) {
            return Err(StageError::input(format!("spec.nodes[{index}].hostName must be provided")));
        }
        if !non_empty_list(node.get("templateRefs")) {
            return Err(StageError::input(format!("spec.nodes[{index}].templateRefs must be provided")));
        }
    }
    Ok(())
}

/// Appends manifest kinds to `spec.suppressedManifests`, skipping ones
/// already listed.
pub fn add_suppressed_manifests<'a>(descriptor: &mut Value, manifests: impl IntoIterator<Item = &'a str>) {
    let Some(spec) = descriptor.get_mut("spec").and_then(Value::as_object_mut) else {
        return;
    };
    let mut list: Vec<Value> = spec
        .get("suppressedManifests")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let before = list.len();
    for manifest in manifests {
        if !list.iter().any(|v| v.as_str() == Some(manifest)) {
            list.push(Value::from(manifest));
        }
    }
    if list.len() != before {
        spec.insert("suppressedManifests".to_string(), Value::Array(list));
    }
}

/// Spec of a descriptor, or null when absent
pub fn spec(descriptor: &Value) -> &Value {
    descriptor.get("spec").unwrap_or(&Value::Null)
}

fn non_empty_string(value: Option<&Value>) -> bool {
    value.and_then(Value::as_str).is_some_and(|s| !s.is_empty())
}

fn non_empty_list(value: Option<&Value>) -> bool {
    value.and_then(Value::as_array).is_some_and(|l| !l.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec_doc() -> Value {
        json!({
            "clusterName": "site-1",
            "templateRefs": [{ "name": "ai-cluster-templates-v1", "namespace": "siteconfig-operator" }],
            "nodes": [{
                "hostName": "node1",
                "templateRefs": [{ "name": "ai-node-templates-v1", "namespace": "siteconfig-operator" }]
            }]
        })
    }

    #[test]
    fn test_render_sets_identity_and_label() {
        let descriptor = render("site-1", "pr-1", spec_doc());
        assert_eq!(descriptor["kind"], "ClusterInstance");
        assert_eq!(descriptor["metadata"]["name"], "site-1");
        assert_eq!(descriptor["metadata"]["namespace"], "site-1");
        assert_eq!(descriptor["metadata"]["labels"][PROVISIONING_REQUEST_NAME_LABEL], "pr-1");
        assert_eq!(spec(&descriptor), &spec_doc());
        assert!(validate(&descriptor).is_ok());
    }

    #[test]
    fn test_missing_cluster_template_refs() {
        let mut doc = spec_doc();
        doc.as_object_mut().unwrap().remove("templateRefs");
        let err = validate(&render("site-1", "pr-1", doc)).unwrap_err();
        assert_eq!(err, StageError::input("spec.templateRefs must be provided"));
    }

    #[test]
    fn test_missing_node_template_refs() {
        let mut doc = spec_doc();
        doc["nodes"][0]["templateRefs"] = json!([]);
        let err = validate(&render("site-1", "pr-1", doc)).unwrap_err();
        assert!(err.is_input());
        assert_eq!(err.to_string(), "spec.nodes[0].templateRefs must be provided");
    }

    #[test]
    fn test_nodes_are_required() {
        let mut doc = spec_doc();
        doc["nodes"] = json!([]);
        assert_eq!(
            validate(&render("site-1", "pr-1", doc)).unwrap_err().to_string(),
            "spec.nodes must be provided"
        );
    }

    #[test]
    fn test_add_suppressed_manifests_skips_duplicates() {
        let mut doc = spec_doc();
        doc["suppressedManifests"] = json!(["BareMetalHost"]);
        let mut descriptor = render("site-1", "pr-1", doc);
        add_suppressed_manifests(&mut descriptor, ["BareMetalHost", "AgentClusterInstall"]);
        add_suppressed_manifests(&mut descriptor, UPGRADE_SUPPRESSED_MANIFESTS);
        assert_eq!(
            spec(&descriptor)["suppressedManifests"],
            json!(["BareMetalHost", "AgentClusterInstall"])
        );
    }
}

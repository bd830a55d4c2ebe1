//! Unit tests for template merging

use super::*;
use serde_json::json;

#[test]
fn test_both_empty_is_an_error() {
    assert_eq!(merge(&json!({}), &Value::Null), Err(ConfigurationError::MissingInput));
}

#[test]
fn test_one_empty_side_returns_the_other() {
    let doc = json!({ "clusterName": "site-1", "nodes": [{ "hostName": "node1" }] });
    assert_eq!(merge(&json!({}), &doc).unwrap(), doc);
    assert_eq!(merge(&doc, &Value::Null).unwrap(), doc);
}

#[test]
fn test_merge_with_empty_input_is_identity() {
    let defaults = json!({ "a": { "b": 1 }, "list": [1, 2] });
    assert_eq!(merge(&defaults, &json!({})).unwrap(), defaults);
}

#[test]
fn test_input_wins_for_scalars_and_nested_maps_merge() {
    let defaults = json!({
        "baseDomain": "example.com",
        "networking": { "machineNetwork": "10.0.0.0/24", "serviceNetwork": "172.30.0.0/16" }
    });
    let input = json!({
        "baseDomain": "lab.example.com",
        "networking": { "machineNetwork": "192.168.1.0/24" }
    });
    let merged = merge(&defaults, &input).unwrap();
    assert_eq!(merged["baseDomain"], "lab.example.com");
    assert_eq!(merged["networking"]["machineNetwork"], "192.168.1.0/24");
    assert_eq!(merged["networking"]["serviceNetwork"], "172.30.0.0/16");
}

#[test]
fn test_sequences_merge_elementwise() {
    let defaults = json!({ "nodes": [
        { "role": "master", "bootMode": "UEFI" },
        { "role": "worker" }
    ]});
    let input = json!({ "nodes": [
        { "hostName": "node1" }
    ]});
    let merged = merge(&defaults, &input).unwrap();
    assert_eq!(merged["nodes"][0], json!({ "role": "master", "bootMode": "UEFI", "hostName": "node1" }));
    assert_eq!(merged["nodes"][1], json!({ "role": "worker" }));

    let longer = json!({ "nodes": [{ "hostName": "node1" }, { "hostName": "node2" }, { "hostName": "node3" }] });
    let merged = merge(&defaults, &longer).unwrap();
    assert_eq!(merged["nodes"].as_array().unwrap().len(), 3);
    assert_eq!(merged["nodes"][2], json!({ "hostName": "node3" }));
}

#[test]
fn test_non_map_sequence_elements_are_replaced() {
    let merged = merge(&json!({ "ntp": ["a", "b"] }), &json!({ "ntp": ["c"] })).unwrap();
    assert_eq!(merged["ntp"], json!(["c", "b"]));
}

#[test]
fn test_container_kind_mismatch_is_an_error() {
    let err = merge(&json!({ "networking": { "a": 1 } }), &json!({ "networking": ["x"] })).unwrap_err();
    assert_eq!(
        err,
        ConfigurationError::TypeMismatch {
            path: "networking".to_string(),
            expected: "mapping",
            found: "sequence",
        }
    );
}

#[test]
fn test_null_input_keeps_default() {
    let merged = merge(&json!({ "a": "x", "b": "y" }), &json!({ "a": null, "b": "z" })).unwrap();
    assert_eq!(merged, json!({ "a": "x", "b": "z" }));
}

#[test]
fn test_template_labels_win_over_input_labels() {
    let defaults = json!({ "extraLabels": { "ManagedCluster": { "a": "x" } } });
    let input = json!({ "extraLabels": { "ManagedCluster": { "a": "y", "b": "z" } } });
    let merged = merge(&defaults, &input).unwrap();
    assert_eq!(merged["extraLabels"], json!({ "ManagedCluster": { "a": "x", "b": "z" } }));
}

#[test]
fn test_defaults_only_label_keys_survive_input_labels() {
    let defaults = json!({ "extraAnnotations": {
        "ManagedCluster": { "owner": "template", "tier": "gold" },
        "ClusterDeployment": { "x": "1" }
    }});
    let input = json!({ "extraAnnotations": { "ManagedCluster": { "owner": "user", "team": "ran" } } });
    let merged = merge(&defaults, &input).unwrap();
    assert_eq!(
        merged["extraAnnotations"],
        json!({
            "ManagedCluster": { "owner": "template", "tier": "gold", "team": "ran" },
            "ClusterDeployment": { "x": "1" }
        })
    );
}

#[test]
fn test_default_resource_types_kept_when_input_sets_other_types() {
    let defaults = json!({ "extraLabels": { "ManagedCluster": { "a": "x" }, "Agent": { "k": "v" } } });
    let input = json!({ "extraLabels": { "ManagedCluster": { "b": "z" } } });
    let merged = merge(&defaults, &input).unwrap();
    assert_eq!(merged["extraLabels"]["ManagedCluster"], json!({ "a": "x", "b": "z" }));
    assert_eq!(merged["extraLabels"]["Agent"], json!({ "k": "v" }));
}

#[test]
fn test_default_labels_kept_when_input_has_none() {
    let defaults = json!({ "extraLabels": { "ManagedCluster": { "a": "x" } }, "clusterName": "" });
    let input = json!({ "clusterName": "site-1" });
    let merged = merge(&defaults, &input).unwrap();
    assert_eq!(merged["extraLabels"], json!({ "ManagedCluster": { "a": "x" } }));
}

#[test]
fn test_node_labels_follow_template_precedence() {
    let defaults = json!({ "nodes": [
        { "extraLabels": { "BareMetalHost": { "role": "du" } } }
    ]});
    let input = json!({ "nodes": [
        { "hostName": "node1", "extraLabels": { "BareMetalHost": { "role": "cu", "rack": "r1" } } },
        { "hostName": "node2", "extraLabels": { "BareMetalHost": { "role": "cu" } } }
    ]});
    let merged = merge(&defaults, &input).unwrap();
    assert_eq!(merged["nodes"][0]["extraLabels"], json!({ "BareMetalHost": { "role": "du", "rack": "r1" } }));
    assert_eq!(merged["nodes"][1]["extraLabels"], json!({ "BareMetalHost": { "role": "cu" } }));
}

#[test]
fn test_label_field_must_be_a_mapping() {
    let err = merge(&json!({ "extraLabels": { "ManagedCluster": "x" } }), &json!({ "extraLabels": { "ManagedCluster": { "a": "b" } } }))
        .unwrap_err();
    assert!(err.to_string().contains("extraLabels.ManagedCluster"), "{err}");
}

//! Hardware allocation helpers.
//!
//! Sizes the NodeAllocationRequest node groups from the rendered descriptor
//! and, once nodes are allocated, back-fills their BMC and MAC details into
//! the descriptor before it is applied.

use provisioning_backend::{AllocatedNode, NodeAllocationRequestSpec, NodeGroup};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

/// ConfigMap key holding the node groups as a YAML list
pub const NODE_GROUPS_DATA_KEY: &str = "node-groups-data";

/// ConfigMap key holding the label of the boot interface
pub const BOOT_INTERFACE_LABEL_KEY: &str = "bootInterfaceLabel";

/// Sizes the template node groups from the descriptor's nodes.
///
/// Each group's size is the number of nodes with its role and its
/// interfaces are the interface labels those nodes declare.
pub fn size_node_groups(descriptor_spec: &Value, template_groups: &[NodeGroup]) -> Result<Vec<NodeGroup>, String> {
    let nodes = descriptor_spec
        .get("nodes")
        .and_then(Value::as_array)
        .ok_or_else(|| "spec.nodes not found in the rendered ClusterInstance".to_string())?;

    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    let mut labels: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for (index, node) in nodes.iter().enumerate() {
        let role = node
            .get("role")
            .and_then(Value::as_str)
            .ok_or_else(|| format!("spec.nodes[{index}].role must be provided"))?;
        *counts.entry(role).or_default() += 1;
        let node_labels = labels.entry(role).or_default();
        for interface in interfaces(node) {
            if let Some(label) = interface.get("label").and_then(Value::as_str).filter(|l| !l.is_empty()) {
                node_labels.insert(label);
            }
        }
    }

    if let Some(role) = counts.keys().find(|role| !template_groups.iter().any(|g| g.role == **role)) {
        return Err(format!("no node group found in the hardware template for role {role}"));
    }

    Ok(template_groups
        .iter()
        .map(|group| NodeGroup {
            size: counts.get(group.role.as_str()).copied().unwrap_or(0),
            interfaces: labels
                .get(group.role.as_str())
                .map(|l| l.iter().map(ToString::to_string).collect())
                .unwrap_or_default(),
            ..group.clone()
        })
        .collect())
}

/// Fills BMC details, boot MAC and interface MACs of every descriptor node
/// from the allocated nodes of the matching group.
///
/// Nodes are taken in name order within a group, so repeated runs assign
/// the same hardware to the same descriptor node.
pub fn apply_node_configuration(
    descriptor: &mut Value,
    request: &NodeAllocationRequestSpec,
    allocated: &[AllocatedNode],
) -> Result<(), String> {
    let group_for_role: HashMap<&str, &str> = request
        .node_group
        .iter()
        .map(|g| (g.role.as_str(), g.name.as_str()))
        .collect();

    let mut sorted: Vec<&AllocatedNode> = allocated.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));
    let mut pools: HashMap<&str, VecDeque<&AllocatedNode>> = HashMap::new();
    for node in sorted {
        pools.entry(node.group_name.as_str()).or_default().push_back(node);
    }

    let nodes = descriptor
        .pointer_mut("/spec/nodes")
        .and_then(Value::as_array_mut)
        .ok_or_else(|| "spec.nodes not found in the rendered ClusterInstance".to_string())?;

    let mut unmatched = Vec::new();
    for (index, node) in nodes.iter_mut().enumerate() {
        let node = node
            .as_object_mut()
            .ok_or_else(|| format!("spec.nodes[{index}] is not a mapping"))?;
        let role = node.get("role").and_then(Value::as_str).unwrap_or_default().to_string();
        let host_name = node.get("hostName").and_then(Value::as_str).unwrap_or_default().to_string();

        let Some(hw_node) = group_for_role
            .get(role.as_str())
            .and_then(|group| pools.get_mut(group))
            .and_then(VecDeque::pop_front)
        else {
            unmatched.push(format!("Index: {index}, Host Name: {host_name}"));
            continue;
        };

        node.insert("bmcAddress".to_string(), json!(hw_node.bmc_address));
        node.insert("bmcCredentialsName".to_string(), json!({ "name": hw_node.bmc_credentials_name }));

        let boot_mac = hw_node.mac_for_label(&request.boot_interface_label).ok_or_else(|| {
            format!(
                "failed to get the boot MAC for node '{host_name}': no boot interface found; missing interface with label {:?}",
                request.boot_interface_label
            )
        })?;
        node.insert("bootMACAddress".to_string(), json!(boot_mac));

        assign_interface_macs(node, hw_node, &host_name)?;
    }

    if unmatched.is_empty() {
        Ok(())
    } else {
        Err(format!("failed to find matches for the following nodes: {}", unmatched.join("; ")))
    }
}

fn assign_interface_macs(node: &mut Map<String, Value>, hw_node: &AllocatedNode, host_name: &str) -> Result<(), String> {
    let Some(interfaces) = node
        .get_mut("nodeNetwork")
        .and_then(|n| n.get_mut("interfaces"))
        .and_then(Value::as_array_mut)
    else {
        return Ok(());
    };

    for interface in interfaces {
        let name = interface.get("name").and_then(Value::as_str).unwrap_or_default().to_string();
        let mac = interface
            .get("label")
            .and_then(Value::as_str)
            .and_then(|label| hw_node.mac_for_label(label))
            .ok_or_else(|| format!("mac address not assigned for interface {name}, node name {host_name}"))?;
        if let Some(interface) = interface.as_object_mut() {
            interface.insert("macAddress".to_string(), json!(mac));
        }
    }
    Ok(())
}

fn interfaces(node: &Value) -> impl Iterator<Item = &Value> {
    node.pointer("/nodeNetwork/interfaces")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

#[cfg(test)]
mod tests {
    use super::*;
    use provisioning_backend::NodeInterface;

    fn template_groups() -> Vec<NodeGroup> {
        vec![
            NodeGroup {
                name: "controller".to_string(),
                role: "master".to_string(),
                hw_profile: "profile-spr-single-processor-64G".to_string(),
                ..Default::default()
            },
            NodeGroup {
                name: "worker".to_string(),
                role: "worker".to_string(),
                hw_profile: "profile-spr-dual-processor-128G".to_string(),
                ..Default::default()
            },
        ]
    }

    fn node(host: &str, role: &str) -> Value {
        json!({
            "hostName": host,
            "role": role,
            "nodeNetwork": { "interfaces": [
                { "name": "eno1", "label": "bootable-interface" },
                { "name": "eno2", "label": "data-interface" }
            ]}
        })
    }

    fn allocated(name: &str, group: &str, last_octet: u8) -> AllocatedNode {
        AllocatedNode {
            name: name.to_string(),
            group_name: group.to_string(),
            bmc_address: format!("idrac-virtualmedia+https://203.0.113.{last_octet}/redfish/v1/Systems/System.Embedded.1"),
            bmc_credentials_name: format!("{name}-bmc-secret"),
            interfaces: vec![
                NodeInterface {
                    name: "eth0".to_string(),
                    label: "bootable-interface".to_string(),
                    mac_address: format!("00:00:00:01:20:{last_octet:02x}"),
                },
                NodeInterface {
                    name: "eth1".to_string(),
                    label: "data-interface".to_string(),
                    mac_address: format!("00:00:00:01:30:{last_octet:02x}"),
                },
            ],
        }
    }

    fn request_spec() -> NodeAllocationRequestSpec {
        NodeAllocationRequestSpec {
            cluster_id: "site-1".to_string(),
            site: "local-west-12345".to_string(),
            boot_interface_label: "bootable-interface".to_string(),
            node_group: template_groups(),
        }
    }

    #[test]
    fn test_size_node_groups_counts_roles() {
        let spec = json!({ "nodes": [node("m0", "master"), node("m1", "master"), node("m2", "master")] });
        let groups = size_node_groups(&spec, &template_groups()).unwrap();
        assert_eq!(groups[0].size, 3);
        assert_eq!(groups[0].interfaces, vec!["bootable-interface".to_string(), "data-interface".to_string()]);
        assert_eq!(groups[1].size, 0);
        assert!(groups[1].interfaces.is_empty());
        assert_eq!(groups[1].hw_profile, "profile-spr-dual-processor-128G");
    }

    #[test]
    fn test_size_node_groups_rejects_unknown_role() {
        let spec = json!({ "nodes": [node("s0", "storage")] });
        let err = size_node_groups(&spec, &template_groups()).unwrap_err();
        assert_eq!(err, "no node group found in the hardware template for role storage");
    }

    #[test]
    fn test_apply_node_configuration_fills_hardware_details() {
        let mut descriptor = json!({ "spec": { "nodes": [node("node1", "master")] } });
        apply_node_configuration(&mut descriptor, &request_spec(), &[allocated("hw-1", "controller", 5)]).unwrap();

        let filled = &descriptor["spec"]["nodes"][0];
        assert_eq!(filled["bmcAddress"], "idrac-virtualmedia+https://203.0.113.5/redfish/v1/Systems/System.Embedded.1");
        assert_eq!(filled["bmcCredentialsName"], json!({ "name": "hw-1-bmc-secret" }));
        assert_eq!(filled["bootMACAddress"], "00:00:00:01:20:05");
        assert_eq!(filled["nodeNetwork"]["interfaces"][0]["macAddress"], "00:00:00:01:20:05");
        assert_eq!(filled["nodeNetwork"]["interfaces"][1]["macAddress"], "00:00:00:01:30:05");
    }

    #[test]
    fn test_apply_node_configuration_is_deterministic() {
        let nodes = [allocated("hw-b", "controller", 2), allocated("hw-a", "controller", 1)];
        let mut first = json!({ "spec": { "nodes": [node("node1", "master"), node("node2", "master")] } });
        let mut second = first.clone();
        apply_node_configuration(&mut first, &request_spec(), &nodes).unwrap();
        apply_node_configuration(&mut second, &request_spec(), &[nodes[1].clone(), nodes[0].clone()]).unwrap();
        assert_eq!(first, second);
        assert_eq!(first["spec"]["nodes"][0]["bmcCredentialsName"]["name"], "hw-a-bmc-secret");
    }

    #[test]
    fn test_unmatched_nodes_are_reported() {
        let mut descriptor = json!({ "spec": { "nodes": [node("node1", "master"), node("node2", "worker")] } });
        let err = apply_node_configuration(&mut descriptor, &request_spec(), &[allocated("hw-1", "controller", 5)]).unwrap_err();
        assert_eq!(err, "failed to find matches for the following nodes: Index: 1, Host Name: node2");
    }

    #[test]
    fn test_missing_boot_interface_is_reported() {
        let mut hw = allocated("hw-1", "controller", 5);
        hw.interfaces.retain(|i| i.label != "bootable-interface");
        let mut descriptor = json!({ "spec": { "nodes": [node("node1", "master")] } });
        let err = apply_node_configuration(&mut descriptor, &request_spec(), &[hw]).unwrap_err();
        assert!(err.contains("no boot interface found; missing interface with label \"bootable-interface\""), "{err}");
    }

    #[test]
    fn test_interface_without_matching_label_is_reported() {
        let mut hw = allocated("hw-1", "controller", 5);
        hw.interfaces.retain(|i| i.label != "data-interface");
        let mut descriptor = json!({ "spec": { "nodes": [node("node1", "master")] } });
        let err = apply_node_configuration(&mut descriptor, &request_spec(), &[hw]).unwrap_err();
        assert_eq!(err, "mac address not assigned for interface eno2, node name node1");
    }
}

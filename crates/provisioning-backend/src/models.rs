//! Collaborator resource models
//!
//! Typed views over the external resources the orchestrator reads and writes.
//! Only the fields the orchestrator depends on are modelled.

use crds::{find_condition, Condition};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Condition type the hardware plugin sets on a NodeAllocationRequest
pub const HARDWARE_PROVISIONED: &str = "Provisioned";

/// Condition reason the hardware plugin uses for terminal failure
pub const HARDWARE_FAILED_REASON: &str = "Failed";

/// Outcome of an idempotent create-or-update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Resource did not exist and was created
    Created,
    /// Resource existed with a different spec and was updated
    Updated,
    /// Resource already matched
    Unchanged,
}

/// One node group of a hardware allocation request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct NodeGroup {
    /// Group name (e.g. "controller", "worker")
    pub name: String,

    /// Node role served by this group ("master" or "worker")
    pub role: String,

    /// Hardware profile requested for nodes of this group
    #[serde(default)]
    pub hw_profile: String,

    /// Number of nodes requested
    #[serde(default)]
    pub size: usize,

    /// Interface labels every node in the group must expose
    #[serde(default)]
    pub interfaces: Vec<String>,
}

/// Spec of a NodeAllocationRequest
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct NodeAllocationRequestSpec {
    /// Cluster identity the nodes are allocated for
    pub cluster_id: String,

    /// O-Cloud site identifier
    #[serde(default)]
    pub site: String,

    /// Label of the interface nodes PXE boot from
    #[serde(default)]
    pub boot_interface_label: String,

    /// Requested node groups
    #[serde(default)]
    pub node_group: Vec<NodeGroup>,
}

/// A hardware allocation request and its observed status
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NodeAllocationRequest {
    /// Object name (the cluster name)
    pub name: String,

    /// Hardware plugin namespace
    pub namespace: String,

    /// Object labels
    pub labels: BTreeMap<String, String>,

    /// Requested allocation
    pub spec: NodeAllocationRequestSpec,

    /// Conditions reported by the hardware plugin
    pub conditions: Vec<Condition>,
}

impl NodeAllocationRequest {
    /// The plugin's `Provisioned` condition, if reported yet
    pub fn provisioned_condition(&self) -> Option<&Condition> {
        find_condition(&self.conditions, HARDWARE_PROVISIONED)
    }
}

/// A network interface of an allocated node
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct NodeInterface {
    /// Interface name on the host
    pub name: String,

    /// Interface label (matches the labels requested per node group)
    #[serde(default)]
    pub label: String,

    /// MAC address
    pub mac_address: String,
}

/// A node allocated by the hardware plugin
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct AllocatedNode {
    /// Node object name
    pub name: String,

    /// Node group the node was allocated for
    pub group_name: String,

    /// BMC address
    pub bmc_address: String,

    /// Name of the secret holding BMC credentials
    pub bmc_credentials_name: String,

    /// Network interfaces
    #[serde(default)]
    pub interfaces: Vec<NodeInterface>,
}

impl AllocatedNode {
    /// MAC address of the interface carrying the given label
    pub fn mac_for_label(&self, label: &str) -> Option<&str> {
        self.interfaces
            .iter()
            .find(|i| i.label == label)
            .map(|i| i.mac_address.as_str())
    }
}

/// A rendered cluster descriptor as stored by the cluster-install backend
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClusterInstance {
    /// Object name
    pub name: String,

    /// Object namespace
    pub namespace: String,

    /// Applied descriptor spec
    pub spec: serde_json::Value,

    /// Sub-conditions reported by the install backend
    pub conditions: Vec<Condition>,
}

/// Policy remediation mode
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RemediationAction {
    /// The policy engine drives the cluster to compliance
    Enforce,
    /// The policy engine only reports compliance
    Inform,
}

impl RemediationAction {
    /// Parses a remediation action case-insensitively
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "enforce" => Some(Self::Enforce),
            "inform" => Some(Self::Inform),
            _ => None,
        }
    }

    /// Wire name
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Enforce => "enforce",
            Self::Inform => "inform",
        }
    }
}

/// Compliance state of a policy against a cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum ComplianceState {
    Compliant,
    NonCompliant,
    Pending,
    /// Not reported yet
    #[default]
    Unset,
}

impl ComplianceState {
    /// Parses the policy engine's compliance string; anything unknown is `Unset`
    pub fn parse(value: &str) -> Self {
        match value {
            "Compliant" => Self::Compliant,
            "NonCompliant" => Self::NonCompliant,
            "Pending" => Self::Pending,
            _ => Self::Unset,
        }
    }

    /// Wire name; `Unset` is the empty string
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Compliant => "Compliant",
            Self::NonCompliant => "NonCompliant",
            Self::Pending => "Pending",
            Self::Unset => "",
        }
    }
}

/// One policy as observed in the cluster namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyRecord {
    /// Child policy name, `<rootNamespace>.<rootName>`
    pub name: String,

    /// Namespace the child policy lives in
    pub namespace: String,

    /// Remediation mode
    pub remediation_action: RemediationAction,

    /// Compliance state
    pub compliance_state: ComplianceState,
}

/// Readiness of a managed cluster as seen by the hub
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ManagedClusterStatus {
    /// Conditions reported on the ManagedCluster
    pub conditions: Vec<Condition>,
}

impl ManagedClusterStatus {
    /// Conditions that must all be True before configuration is evaluated
    pub const READY_CONDITIONS: [&'static str; 3] = [
        "ManagedClusterConditionAvailable",
        "HubAcceptedManagedCluster",
        "ManagedClusterJoined",
    ];

    /// Returns true when the cluster is available, accepted and joined
    pub fn is_ready(&self) -> bool {
        Self::READY_CONDITIONS
            .iter()
            .all(|t| find_condition(&self.conditions, t).is_some_and(Condition::is_true))
    }
}

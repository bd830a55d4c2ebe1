//! ProvisioningRequest CRD
//!
//! Root entity describing a desired cluster. The orchestrator is the only
//! writer of its status.

use crate::conditions::Condition;
use crate::references::{ClusterTemplateRef, NodeAllocationRequestRef};
use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Template parameter holding the cluster name
pub const TEMPLATE_PARAM_CLUSTER_NAME: &str = "nodeClusterName";

/// Template parameter holding the O-Cloud site identifier
pub const TEMPLATE_PARAM_SITE_ID: &str = "oCloudSiteId";

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "o2ims.provisioning.oran.org",
    version = "v1alpha1",
    kind = "ProvisioningRequest",
    status = "ProvisioningRequestStatus",
    shortname = "oranpr"
)]
#[serde(rename_all = "camelCase")]
pub struct ProvisioningRequestSpec {
    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Free-text description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Name of the referenced ClusterTemplate
    pub template_name: String,

    /// Version of the referenced ClusterTemplate
    pub template_version: String,

    /// User input, validated against the template parameter schema
    #[schemars(schema_with = "crate::schema::preserve_unknown_fields")]
    pub template_parameters: serde_json::Value,
}

impl ProvisioningRequestSpec {
    /// Reference to the ClusterTemplate this request instantiates
    pub fn template_ref(&self) -> ClusterTemplateRef {
        ClusterTemplateRef {
            name: self.template_name.clone(),
            version: self.template_version.clone(),
        }
    }

    /// Looks up a top-level template parameter
    pub fn template_parameter(&self, key: &str) -> Option<&serde_json::Value> {
        self.template_parameters.get(key)
    }

    /// Looks up a top-level string template parameter
    pub fn string_parameter(&self, key: &str) -> Option<&str> {
        self.template_parameter(key).and_then(serde_json::Value::as_str)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProvisioningRequestStatus {
    /// Stage conditions in pipeline order
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Overall provisioning phase
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioning_status: Option<ProvisioningStatus>,

    /// Generation last processed by the orchestrator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Derived details about the cluster, hardware and policies
    #[serde(default)]
    pub extensions: StatusExtensions,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusExtensions {
    /// Details of the installed cluster
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_details: Option<ClusterDetails>,

    /// Hardware allocation request owned by this ProvisioningRequest
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_allocation_request_ref: Option<NodeAllocationRequestRef>,

    /// Policy compliance snapshot, replaced wholesale on each run
    #[serde(default)]
    pub policies: Vec<PolicyDetails>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterDetails {
    /// Cluster name (ClusterInstance name and namespace)
    pub name: String,

    /// Set once, when cluster installation is first observed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_provision_started_at: Option<DateTime<Utc>>,

    /// Time the cluster first became non-compliant with an enforce policy
    ///
    /// Serialized as null when unset so a status merge patch clears it.
    #[serde(default)]
    pub non_compliant_at: Option<DateTime<Utc>>,

    /// Zero-touch provisioning status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ztp_status: Option<ZtpStatus>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
/// Zero-touch provisioning status
///
/// Moves to `Done` the first time configuration completes and never reverts.
pub enum ZtpStatus {
    #[serde(rename = "ZTP Done")]
    Done,

    #[serde(rename = "ZTP Not Done")]
    NotDone,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDetails {
    /// Root policy name
    pub policy_name: String,

    /// Root policy namespace
    pub policy_namespace: String,

    /// "enforce" or "inform"
    pub remediation_action: String,

    /// "Compliant", "NonCompliant", "Pending" or empty
    #[serde(default)]
    pub compliant: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProvisioningStatus {
    /// Overall phase
    pub provisioning_phase: ProvisioningPhase,

    /// Message explaining the phase
    #[serde(default)]
    pub provisioning_details: String,

    /// Time the phase or details last changed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
/// Overall provisioning phase
///
/// Serializes as lowercase ("pending", "progressing", etc.).
#[serde(rename_all = "lowercase")]
pub enum ProvisioningPhase {
    /// Nothing has completed yet
    #[default]
    Pending,

    /// At least one stage completed, work remains
    Progressing,

    /// Cluster installed and configured
    Fulfilled,

    /// A stage failed or timed out
    Failed,
}

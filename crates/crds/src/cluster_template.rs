//! ClusterTemplate CRD
//!
//! Read-only reference entity supplying default documents, a parameter schema
//! and a validity flag that is reconciled independently.

use crate::conditions::{find_condition, Condition};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition type the template validator sets on a valid ClusterTemplate
pub const CLUSTER_TEMPLATE_VALIDATED: &str = "ClusterTemplateValidated";

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "o2ims.provisioning.oran.org",
    version = "v1alpha1",
    kind = "ClusterTemplate",
    namespaced,
    status = "ClusterTemplateStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterTemplateSpec {
    /// Template name
    pub name: String,

    /// Template version
    pub version: String,

    /// Free-text description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// ConfigMaps holding the per-stage defaults
    pub templates: Templates,

    /// JSON schema for the ProvisioningRequest `templateParameters`
    #[schemars(schema_with = "crate::schema::preserve_unknown_fields")]
    pub template_parameter_schema: serde_json::Value,
}

/// Names of the ConfigMaps (in the template namespace) that hold defaults
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct Templates {
    /// ConfigMap with the `clusterinstance-defaults` document
    pub cluster_instance_defaults: String,

    /// ConfigMap with the `policytemplate-defaults` document
    pub policy_template_defaults: String,

    /// ConfigMap with the hardware node groups and boot interface label
    pub hw_template: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct ClusterTemplateStatus {
    /// Validation conditions
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl ClusterTemplate {
    /// Returns true while the template validator reports the template as valid
    pub fn is_validated(&self) -> bool {
        self.status
            .as_ref()
            .and_then(|s| find_condition(&s.conditions, CLUSTER_TEMPLATE_VALIDATED))
            .is_some_and(Condition::is_true)
    }
}

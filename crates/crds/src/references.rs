//! Object references recorded in ProvisioningRequest status
//!
//! Provides the reference to the hardware allocation request the orchestrator
//! owns, together with the timestamp used for hardware timeout detection.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Reference to the NodeAllocationRequest submitted for a ProvisioningRequest
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct NodeAllocationRequestRef {
    /// Name of the NodeAllocationRequest (the cluster name)
    pub name: String,

    /// Hardware plugin namespace the request lives in
    pub namespace: String,

    /// Set once, the first time hardware provisioning is observed in progress
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hardware_provisioning_check_start: Option<DateTime<Utc>>,
}

impl NodeAllocationRequestRef {
    /// Create a new reference without a check-start timestamp
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            hardware_provisioning_check_start: None,
        }
    }
}

/// Reference from a ProvisioningRequest to the ClusterTemplate it instantiates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterTemplateRef {
    /// Template name
    pub name: String,

    /// Template version
    pub version: String,
}

impl ClusterTemplateRef {
    /// Name of the ClusterTemplate CR, `<name>.<version>`
    pub fn object_name(&self) -> String {
        format!("{}.{}", self.name, self.version)
    }
}

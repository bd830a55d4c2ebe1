//! Status conditions
//!
//! Condition records follow the Kubernetes `metav1.Condition` wire shape so the
//! same type can be read back from ClusterInstance and NodeAllocationRequest
//! status blocks.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single named stage verdict.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type (e.g. "Validated", "Provisioned")
    #[serde(rename = "type")]
    pub type_: String,

    /// True, False or Unknown
    pub status: ConditionStatus,

    /// Machine-readable reason in PascalCase
    #[serde(default)]
    pub reason: String,

    /// Human-readable message
    #[serde(default)]
    pub message: String,

    /// Last time the status or reason changed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,
}

impl Condition {
    /// Returns true if the condition status is True.
    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }

    /// Returns true if the condition carries the given reason.
    pub fn has_reason(&self, reason: ConditionReason) -> bool {
        self.reason == reason.as_str()
    }
}

/// Finds a condition by type in a condition list.
pub fn find_condition<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
/// Condition status
#[serde(rename_all = "PascalCase")]
pub enum ConditionStatus {
    /// Condition holds
    True,

    /// Condition does not hold
    False,

    /// Not yet determined
    #[default]
    Unknown,
}

impl fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::True => "True",
            Self::False => "False",
            Self::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// Stage condition types written on a ProvisioningRequest, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConditionType {
    Validated,
    ClusterInstanceRendered,
    ClusterResourcesCreated,
    HardwareTemplateRendered,
    HardwareProvisioned,
    HardwareNodeConfigApplied,
    ClusterInstanceProcessed,
    ClusterProvisioned,
    ConfigurationApplied,
}

impl ConditionType {
    /// All stage conditions in the order they are appended.
    pub const ALL: [ConditionType; 9] = [
        Self::Validated,
        Self::ClusterInstanceRendered,
        Self::ClusterResourcesCreated,
        Self::HardwareTemplateRendered,
        Self::HardwareProvisioned,
        Self::HardwareNodeConfigApplied,
        Self::ClusterInstanceProcessed,
        Self::ClusterProvisioned,
        Self::ConfigurationApplied,
    ];

    /// Wire name of the condition type.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validated => "Validated",
            Self::ClusterInstanceRendered => "ClusterInstanceRendered",
            Self::ClusterResourcesCreated => "ClusterResourcesCreated",
            Self::HardwareTemplateRendered => "HardwareTemplateRendered",
            Self::HardwareProvisioned => "HardwareProvisioned",
            Self::HardwareNodeConfigApplied => "HardwareNodeConfigApplied",
            Self::ClusterInstanceProcessed => "ClusterInstanceProcessed",
            Self::ClusterProvisioned => "ClusterProvisioned",
            Self::ConfigurationApplied => "ConfigurationApplied",
        }
    }

    /// Position of the condition type in the pipeline.
    pub fn rank(self) -> usize {
        Self::ALL.iter().position(|t| *t == self).unwrap_or(Self::ALL.len())
    }

    /// Looks up a condition type by wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }
}

impl fmt::Display for ConditionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reasons written by the orchestrator.
///
/// Mirrored conditions may carry reasons from the collaborator that are not
/// listed here, which is why [`Condition::reason`] stays a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionReason {
    Completed,
    Failed,
    InProgress,
    Unknown,
    TimedOut,
    Missing,
    OutOfDate,
    ClusterNotReady,
    NotApplied,
}

impl ConditionReason {
    /// Wire name of the reason.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::InProgress => "InProgress",
            Self::Unknown => "Unknown",
            Self::TimedOut => "TimedOut",
            Self::Missing => "Missing",
            Self::OutOfDate => "OutOfDate",
            Self::ClusterNotReady => "ClusterNotReady",
            Self::NotApplied => "NotApplied",
        }
    }
}

impl fmt::Display for ConditionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

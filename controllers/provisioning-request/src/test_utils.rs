//! Test utilities for pipeline tests
//!
//! Builds a single-node ClusterTemplate with its default ConfigMaps and a
//! ProvisioningRequest that instantiates it, all served by a MockBackend.

use crate::config::ControllerSettings;
use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crate::requeue::Requeue;
use chrono::{DateTime, TimeZone, Utc};
use crds::*;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use provisioning_backend::*;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const TEMPLATE_NAMESPACE: &str = "sno-templates";
pub const HARDWARE_NAMESPACE: &str = "hardware-manager";
pub const REQUEST_NAME: &str = "pr-site-sno-du-1";
pub const CLUSTER_NAME: &str = "site-sno-du-1";
pub const CLUSTER_DEFAULTS: &str = "sno-ran-du-defaults-v1";
pub const POLICY_DEFAULTS: &str = "sno-ran-du-policy-defaults-v1";
pub const HW_TEMPLATE: &str = "hwtemplate-sno-du-v1";
pub const PULL_SECRET: &str = "pull-secret";

pub const CLUSTER_DEFAULTS_YAML: &str = r#"
clusterImageSetNameRef: "4.16"
pullSecretRef:
  name: pull-secret
templateRefs:
  - name: ai-cluster-templates-v1
    namespace: siteconfig-operator
extraLabels:
  ManagedCluster:
    cluster-version: "v4.16"
nodes:
  - role: master
    templateRefs:
      - name: ai-node-templates-v1
        namespace: siteconfig-operator
    nodeNetwork:
      interfaces:
        - name: eno1
          label: bootable-interface
"#;

pub const POLICY_DEFAULTS_YAML: &str = r#"
cpu-isolated: "2-31"
sriov-network-vlan-1: "114"
"#;

pub const NODE_GROUPS_YAML: &str = r#"
- name: controller
  role: master
  hwProfile: profile-spr-single-processor-64G
- name: worker
  role: worker
  hwProfile: profile-spr-dual-processor-128G
"#;

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
}

pub fn minutes_later(minutes: i64) -> DateTime<Utc> {
    start_time() + chrono::Duration::minutes(minutes)
}

pub fn parameter_schema() -> Value {
    json!({
        "type": "object",
        "required": ["nodeClusterName", "oCloudSiteId", "clusterInstanceParameters"],
        "properties": {
            "nodeClusterName": { "type": "string" },
            "oCloudSiteId": { "type": "string" },
            "policyTemplateParameters": { "type": "object" },
            "clusterInstanceParameters": {
                "type": "object",
                "required": ["clusterName", "nodes"],
                "properties": {
                    "clusterName": { "type": "string" },
                    "baseDomain": { "type": "string" },
                    "extraLabels": { "type": "object", "additionalProperties": { "type": "object" } },
                    "nodes": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "required": ["hostName"],
                            "properties": { "hostName": { "type": "string" } }
                        }
                    }
                }
            }
        }
    })
}

pub fn condition(type_: &str, status: ConditionStatus, reason: &str, message: &str) -> Condition {
    Condition {
        type_: type_.to_string(),
        status,
        reason: reason.to_string(),
        message: message.to_string(),
        last_transition_time: None,
    }
}

pub fn cluster_template(validated: bool) -> ClusterTemplate {
    let status = if validated { ConditionStatus::True } else { ConditionStatus::False };
    ClusterTemplate {
        metadata: ObjectMeta {
            name: Some("sno-ran-du.v1".to_string()),
            namespace: Some(TEMPLATE_NAMESPACE.to_string()),
            ..Default::default()
        },
        spec: ClusterTemplateSpec {
            name: "sno-ran-du".to_string(),
            version: "v1".to_string(),
            description: None,
            templates: Templates {
                cluster_instance_defaults: CLUSTER_DEFAULTS.to_string(),
                policy_template_defaults: POLICY_DEFAULTS.to_string(),
                hw_template: HW_TEMPLATE.to_string(),
            },
            template_parameter_schema: parameter_schema(),
        },
        status: Some(ClusterTemplateStatus {
            conditions: vec![condition(CLUSTER_TEMPLATE_VALIDATED, status, "Completed", "")],
        }),
    }
}

fn config_map(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
    entries.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

/// Seeds a backend with the template, its ConfigMaps and the pull secret.
pub fn seed_backend(backend: &MockBackend, cluster_defaults: &str) {
    backend.add_cluster_template(cluster_template(true));
    backend.add_config_map(
        TEMPLATE_NAMESPACE,
        CLUSTER_DEFAULTS,
        config_map(&[("clusterinstance-defaults", cluster_defaults)]),
    );
    backend.add_config_map(
        TEMPLATE_NAMESPACE,
        POLICY_DEFAULTS,
        config_map(&[("policytemplate-defaults", POLICY_DEFAULTS_YAML)]),
    );
    backend.add_config_map(
        TEMPLATE_NAMESPACE,
        HW_TEMPLATE,
        config_map(&[
            ("node-groups-data", NODE_GROUPS_YAML),
            ("bootInterfaceLabel", "bootable-interface"),
            ("hardwareProvisioningTimeout", "90m"),
        ]),
    );
    backend.add_secret(TEMPLATE_NAMESPACE, PULL_SECRET);
}

pub fn seeded_backend() -> MockBackend {
    let backend = MockBackend::new();
    seed_backend(&backend, CLUSTER_DEFAULTS_YAML);
    backend
}

pub fn template_parameters() -> Value {
    json!({
        "nodeClusterName": CLUSTER_NAME,
        "oCloudSiteId": "local-west-12345",
        "policyTemplateParameters": { "sriov-network-vlan-1": "140" },
        "clusterInstanceParameters": {
            "clusterName": CLUSTER_NAME,
            "baseDomain": "example.com",
            "nodes": [{ "hostName": "node1.example.com" }]
        }
    })
}

pub fn provisioning_request(parameters: Value) -> ProvisioningRequest {
    ProvisioningRequest {
        metadata: ObjectMeta {
            name: Some(REQUEST_NAME.to_string()),
            generation: Some(1),
            ..Default::default()
        },
        spec: ProvisioningRequestSpec {
            name: Some("site-sno-du-1".to_string()),
            description: None,
            template_name: "sno-ran-du".to_string(),
            template_version: "v1".to_string(),
            template_parameters: parameters,
        },
        status: None,
    }
}

pub fn test_reconciler(backend: &MockBackend) -> Reconciler {
    let settings = ControllerSettings {
        hardware_namespace: HARDWARE_NAMESPACE.to_string(),
        ..Default::default()
    };
    Reconciler::new(Arc::new(backend.clone()), settings)
}

pub fn allocated_node() -> AllocatedNode {
    AllocatedNode {
        name: "master-node-a".to_string(),
        group_name: "controller".to_string(),
        bmc_address: "idrac-virtualmedia+https://203.0.113.5/redfish/v1/Systems/System.Embedded.1".to_string(),
        bmc_credentials_name: "site-sno-du-1-bmc-secret".to_string(),
        interfaces: vec![NodeInterface {
            name: "eno1".to_string(),
            label: "bootable-interface".to_string(),
            mac_address: "00:00:00:01:20:30".to_string(),
        }],
    }
}

/// Marks the NodeAllocationRequest provisioned and publishes its node
pub fn complete_hardware(backend: &MockBackend) {
    backend.set_node_allocation_conditions(
        HARDWARE_NAMESPACE,
        CLUSTER_NAME,
        vec![condition("Provisioned", ConditionStatus::True, "Completed", "Provisioned")],
    );
    backend.set_allocated_nodes(HARDWARE_NAMESPACE, CLUSTER_NAME, vec![allocated_node()]);
}

/// ClusterInstance conditions of a processed instance plus `Provisioned`
pub fn cluster_instance_conditions(provisioned: ConditionStatus, reason: &str, message: &str) -> Vec<Condition> {
    let mut conditions: Vec<Condition> = [
        "ClusterInstanceValidated",
        "RenderedTemplates",
        "RenderedTemplatesValidated",
        "RenderedTemplatesApplied",
    ]
    .iter()
    .map(|t| condition(t, ConditionStatus::True, "Completed", ""))
    .collect();
    conditions.push(condition("Provisioned", provisioned, reason, message));
    conditions
}

pub fn ready_managed_cluster() -> ManagedClusterStatus {
    ManagedClusterStatus {
        conditions: ManagedClusterStatus::READY_CONDITIONS
            .iter()
            .map(|t| condition(t, ConditionStatus::True, "", ""))
            .collect(),
    }
}

pub fn enforce_policy(state: ComplianceState) -> PolicyRecord {
    PolicyRecord {
        name: format!("ztp-{TEMPLATE_NAMESPACE}.v1-perf-policy"),
        namespace: CLUSTER_NAME.to_string(),
        remediation_action: RemediationAction::Enforce,
        compliance_state: state,
    }
}

/// Runs one reconciliation and feeds the written status back into the request.
pub async fn reconcile(
    reconciler: &Reconciler,
    backend: &MockBackend,
    request: &mut ProvisioningRequest,
    now: DateTime<Utc>,
) -> Result<Requeue, ControllerError> {
    let result = reconciler.reconcile_at(request, now).await;
    if let Some(status) = backend.status(REQUEST_NAME) {
        request.status = Some(status);
    }
    result
}

/// The condition of `type_` on the request
pub fn condition_of(request: &ProvisioningRequest, type_: ConditionType) -> Condition {
    request
        .status
        .as_ref()
        .and_then(|s| find_condition(&s.conditions, type_.as_str()))
        .cloned()
        .unwrap_or_else(|| panic!("condition {type_} not recorded"))
}

pub fn has_condition(request: &ProvisioningRequest, type_: ConditionType) -> bool {
    request
        .status
        .as_ref()
        .is_some_and(|s| find_condition(&s.conditions, type_.as_str()).is_some())
}

pub fn phase_of(request: &ProvisioningRequest) -> ProvisioningPhase {
    request
        .status
        .as_ref()
        .and_then(|s| s.provisioning_status.as_ref())
        .map(|p| p.provisioning_phase)
        .unwrap_or_default()
}

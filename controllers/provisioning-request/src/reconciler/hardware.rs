//! Hardware stages: node group rendering, NodeAllocationRequest submission
//! and provisioning observation.

use super::ProvisioningTask;
use crate::descriptor;
use crate::error::StageError;
use crate::hardware::{size_node_groups, BOOT_INTERFACE_LABEL_KEY, NODE_GROUPS_DATA_KEY};
use crate::timeouts::{is_timed_out, start_once};
use crds::{
    Condition, ConditionReason, ConditionStatus, ConditionType, NodeAllocationRequestRef, TEMPLATE_PARAM_SITE_ID,
};
use provisioning_backend::{
    ApplyOutcome, NodeAllocationRequest, NodeAllocationRequestSpec, NodeGroup, HARDWARE_FAILED_REASON,
};
use serde_json::Value;
use tracing::{debug, info, warn};

/// Observed state of the NodeAllocationRequest
pub(super) struct HardwareState {
    pub(super) provisioned: bool,
    pub(super) timed_out_or_failed: bool,
    pub(super) request: NodeAllocationRequest,
}

impl ProvisioningTask<'_> {
    pub(super) fn handle_render_hardware_template(&mut self, rendered: &Value) -> Result<NodeAllocationRequest, StageError> {
        let result = self.render_hardware_template(rendered);
        self.record_stage(
            ConditionType::HardwareTemplateRendered,
            &result,
            "Rendered Hardware template successfully",
            "Failed to render the Hardware template",
        );
        result
    }

    fn render_hardware_template(&self, rendered: &Value) -> Result<NodeAllocationRequest, StageError> {
        let cluster_name = self.cluster_name()?;
        let inputs = self.inputs()?;
        let config_map = &inputs.template.spec.templates.hw_template;
        let data = &inputs.hardware_template;

        let raw_groups = data.get(NODE_GROUPS_DATA_KEY).ok_or_else(|| {
            StageError::input(format!("ConfigMap {config_map} does not contain the {NODE_GROUPS_DATA_KEY} key"))
        })?;
        let template_groups: Vec<NodeGroup> = serde_yaml::from_str(raw_groups).map_err(|e| {
            StageError::input(format!(
                "the value of key {NODE_GROUPS_DATA_KEY} from ConfigMap {config_map} is not a valid node group list: {e}"
            ))
        })?;
        let boot_interface_label = data
            .get(BOOT_INTERFACE_LABEL_KEY)
            .filter(|l| !l.is_empty())
            .ok_or_else(|| {
                StageError::input(format!("ConfigMap {config_map} does not contain the {BOOT_INTERFACE_LABEL_KEY} key"))
            })?;
        let site = self
            .request
            .spec
            .string_parameter(TEMPLATE_PARAM_SITE_ID)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| StageError::input(format!("templateParameters.{TEMPLATE_PARAM_SITE_ID} must be provided")))?;

        let node_group = size_node_groups(descriptor::spec(rendered), &template_groups).map_err(StageError::Input)?;

        Ok(NodeAllocationRequest {
            name: cluster_name.to_string(),
            namespace: self.settings.hardware_namespace.clone(),
            labels: self.owner_labels(),
            spec: NodeAllocationRequestSpec {
                cluster_id: cluster_name.to_string(),
                site: site.to_string(),
                boot_interface_label: boot_interface_label.clone(),
                node_group,
            },
            conditions: Vec::new(),
        })
    }

    pub(super) async fn create_node_allocation_request(&mut self, request: &NodeAllocationRequest) -> Result<(), StageError> {
        let outcome = self.backend.apply_node_allocation_request(request).await?;
        match outcome {
            ApplyOutcome::Created => info!("Created NodeAllocationRequest {}/{}", request.namespace, request.name),
            ApplyOutcome::Updated => info!("Updated node groups of NodeAllocationRequest {}/{}", request.namespace, request.name),
            ApplyOutcome::Unchanged => debug!("NodeAllocationRequest {}/{} is up to date", request.namespace, request.name),
        }

        let current = self.extensions.node_allocation_request_ref.as_ref();
        if current.is_none_or(|r| r.name != request.name || r.namespace != request.namespace) {
            self.extensions.node_allocation_request_ref =
                Some(NodeAllocationRequestRef::new(&request.name, &request.namespace));
        }
        Ok(())
    }

    /// Reads the NodeAllocationRequest and records HardwareProvisioned.
    pub(super) async fn wait_for_hardware(&mut self, namespace: &str, name: &str) -> Result<HardwareState, StageError> {
        let request = self
            .backend
            .get_node_allocation_request(namespace, name)
            .await?
            .ok_or_else(|| StageError::transient(format!("NodeAllocationRequest {namespace}/{name} does not exist")))?;
        let (provisioned, timed_out_or_failed) = self.update_hardware_provisioned(&request);
        Ok(HardwareState {
            provisioned,
            timed_out_or_failed,
            request,
        })
    }

    fn update_hardware_provisioned(&mut self, request: &NodeAllocationRequest) -> (bool, bool) {
        let mut condition = match request.provisioned_condition() {
            Some(c) => c.clone(),
            None => Condition {
                type_: ConditionType::HardwareProvisioned.as_str().to_string(),
                status: ConditionStatus::Unknown,
                reason: ConditionReason::Unknown.as_str().to_string(),
                message: format!("Waiting for NodeAllocationRequest ({}) to be processed", request.name),
                last_transition_time: None,
            },
        };

        let failed = condition.status == ConditionStatus::False && condition.reason == HARDWARE_FAILED_REASON;
        if failed {
            condition.message = with_detail("Hardware provisioning failed", &condition.message);
        } else if condition.status == ConditionStatus::False {
            condition.message = "Hardware provisioning is in progress".to_string();
        }

        let mut timed_out = false;
        if !condition.is_true() && !failed {
            let reference = self
                .extensions
                .node_allocation_request_ref
                .get_or_insert_with(|| NodeAllocationRequestRef::new(&request.name, &request.namespace));
            let started = start_once(&mut reference.hardware_provisioning_check_start, self.now);
            if is_timed_out(started, self.now, self.timeouts.hardware_provisioning) {
                condition.status = ConditionStatus::False;
                condition.reason = ConditionReason::TimedOut.as_str().to_string();
                condition.message = "Hardware provisioning timed out".to_string();
                timed_out = true;
            }
        }

        if self.ledger.mirror(ConditionType::HardwareProvisioned, &condition, self.now) {
            if failed || timed_out {
                warn!("NodeAllocationRequest {}: {}", request.name, condition.message);
            } else {
                info!("NodeAllocationRequest {}: {}", request.name, condition.message);
            }
        }
        (condition.is_true(), failed || timed_out)
    }
}

fn with_detail(summary: &str, detail: &str) -> String {
    if detail.is_empty() {
        summary.to_string()
    } else {
        format!("{summary}: {detail}")
    }
}

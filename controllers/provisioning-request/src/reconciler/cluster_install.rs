//! Cluster installation stage: node back-fill, the real ClusterInstance
//! apply and install progress tracking.

use super::ProvisioningTask;
use crate::conditions::ConditionLedger;
use crate::error::StageError;
use crate::hardware;
use crate::timeouts::{is_timed_out, start_once};
use chrono::{DateTime, Utc};
use crds::{find_condition, ClusterDetails, Condition, ConditionReason, ConditionStatus, ConditionType};
use provisioning_backend::{ApplyOutcome, ClusterInstance, NodeAllocationRequest};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

/// ClusterInstance conditions that must all be True before it counts as processed
const PROCESSING_CONDITIONS: [&str; 4] = [
    "ClusterInstanceValidated",
    "RenderedTemplates",
    "RenderedTemplatesValidated",
    "RenderedTemplatesApplied",
];

/// ClusterInstance condition tracking the installation itself
const INSTANCE_PROVISIONED: &str = "Provisioned";

impl ProvisioningTask<'_> {
    pub(super) async fn handle_cluster_installation(
        &mut self,
        mut rendered: Value,
        allocation: &NodeAllocationRequest,
    ) -> Result<(), StageError> {
        let cluster_name = self.cluster_name()?;
        self.apply_node_configuration(&mut rendered, allocation).await?;

        match self.backend.apply_cluster_instance(&rendered, false).await {
            Ok(ApplyOutcome::Created) => info!("Created ClusterInstance {}", cluster_name),
            Ok(ApplyOutcome::Updated) => info!("Updated ClusterInstance {}", cluster_name),
            Ok(ApplyOutcome::Unchanged) => debug!("ClusterInstance {} is up to date", cluster_name),
            Err(err) => {
                let err = StageError::from(err);
                if err.is_input() {
                    self.ledger.set(
                        ConditionType::ClusterInstanceProcessed,
                        ConditionReason::Failed,
                        ConditionStatus::False,
                        format!("Failed to apply the rendered ClusterInstance ({cluster_name}): {err}"),
                        self.now,
                    );
                }
                return Err(err.context(format!("failed to apply ClusterInstance {cluster_name}")));
            }
        }

        self.extensions.cluster_details.get_or_insert_with(|| ClusterDetails {
            name: cluster_name.to_string(),
            ..Default::default()
        });
        self.check_cluster_provision_status(cluster_name).await
    }

    async fn apply_node_configuration(
        &mut self,
        rendered: &mut Value,
        allocation: &NodeAllocationRequest,
    ) -> Result<(), StageError> {
        let nodes = self
            .backend
            .list_allocated_nodes(&allocation.namespace, &allocation.name)
            .await?;
        match hardware::apply_node_configuration(rendered, &allocation.spec, &nodes) {
            Ok(()) => {
                self.ledger.set(
                    ConditionType::HardwareNodeConfigApplied,
                    ConditionReason::Completed,
                    ConditionStatus::True,
                    "Node configuration has been applied to the rendered ClusterInstance",
                    self.now,
                );
                Ok(())
            }
            Err(message) => {
                warn!("Node configuration for {} is incomplete: {}", allocation.name, message);
                self.ledger.set(
                    ConditionType::HardwareNodeConfigApplied,
                    ConditionReason::NotApplied,
                    ConditionStatus::False,
                    format!("Failed to apply node configuration to the rendered ClusterInstance: {message}"),
                    self.now,
                );
                // Allocated node details can lag behind the Provisioned condition
                Err(StageError::Transient(message))
            }
        }
    }

    /// Mirrors the ClusterInstance status into ClusterInstanceProcessed and
    /// ClusterProvisioned.
    pub(super) async fn check_cluster_provision_status(&mut self, cluster_name: &str) -> Result<(), StageError> {
        let instance = self
            .backend
            .get_cluster_instance(cluster_name, cluster_name)
            .await?
            .ok_or_else(|| StageError::transient(format!("ClusterInstance {cluster_name} does not exist")))?;

        update_cluster_instance_processed(&mut self.ledger, &instance, self.now);
        let details = self.extensions.cluster_details.get_or_insert_with(|| ClusterDetails {
            name: cluster_name.to_string(),
            ..Default::default()
        });
        update_cluster_provisioned(
            &mut self.ledger,
            details,
            &instance,
            self.now,
            self.timeouts.cluster_installation,
        );
        Ok(())
    }
}

fn update_cluster_instance_processed(ledger: &mut ConditionLedger, instance: &ClusterInstance, now: DateTime<Utc>) {
    let waiting = || format!("Waiting for ClusterInstance ({}) to be processed", instance.name);
    for type_ in PROCESSING_CONDITIONS {
        match find_condition(&instance.conditions, type_) {
            None => {
                ledger.set(
                    ConditionType::ClusterInstanceProcessed,
                    ConditionReason::Unknown,
                    ConditionStatus::Unknown,
                    waiting(),
                    now,
                );
                return;
            }
            Some(condition) if !condition.is_true() => {
                ledger.mirror(ConditionType::ClusterInstanceProcessed, condition, now);
                return;
            }
            Some(_) => {}
        }
    }
    ledger.set(
        ConditionType::ClusterInstanceProcessed,
        ConditionReason::Completed,
        ConditionStatus::True,
        format!("Applied and processed ClusterInstance ({}) successfully", instance.name),
        now,
    );
}

/// Builds the ClusterProvisioned verdict, applying the install budget, and
/// records it in a single ledger write.
fn update_cluster_provisioned(
    ledger: &mut ConditionLedger,
    details: &mut ClusterDetails,
    instance: &ClusterInstance,
    now: DateTime<Utc>,
    budget: Duration,
) {
    let mut condition = match find_condition(&instance.conditions, INSTANCE_PROVISIONED) {
        Some(condition) => condition.clone(),
        None if ledger.is_true(ConditionType::ClusterInstanceProcessed) => Condition {
            type_: ConditionType::ClusterProvisioned.as_str().to_string(),
            status: ConditionStatus::Unknown,
            reason: ConditionReason::Unknown.as_str().to_string(),
            message: "Waiting for cluster installation to start".to_string(),
            last_transition_time: None,
        },
        None => return,
    };

    let started = start_once(&mut details.cluster_provision_started_at, now);
    let failed = condition.status == ConditionStatus::False && condition.reason == ConditionReason::Failed.as_str();
    let timed_out = !condition.is_true() && !failed && is_timed_out(started, now, budget);
    if timed_out {
        condition.status = ConditionStatus::False;
        condition.reason = ConditionReason::TimedOut.as_str().to_string();
        condition.message = "Cluster installation timed out".to_string();
    }

    if ledger.mirror(ConditionType::ClusterProvisioned, &condition, now) && timed_out {
        warn!("Installation of cluster {} timed out", instance.name);
    }
}

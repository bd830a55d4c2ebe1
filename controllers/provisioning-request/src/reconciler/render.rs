//! ClusterInstance rendering stage.

use super::ProvisioningTask;
use crate::descriptor;
use crate::error::StageError;
use crate::immutable;
use crds::{ConditionReason, ConditionStatus, ConditionType};
use serde_json::Value;
use tracing::{debug, info};

impl ProvisioningTask<'_> {
    pub(super) async fn handle_render_cluster_instance(&mut self) -> Result<Value, StageError> {
        let result = self.render_cluster_instance().await;
        self.record_stage(
            ConditionType::ClusterInstanceRendered,
            &result,
            "ClusterInstance rendered and passed dry-run validation",
            "Failed to render and validate ClusterInstance",
        );
        result
    }

    async fn render_cluster_instance(&self) -> Result<Value, StageError> {
        let cluster_name = self.cluster_name()?;
        let inputs = self.inputs()?;
        let mut rendered = descriptor::render(cluster_name, &self.name, inputs.cluster_data.clone());
        descriptor::validate(&rendered)?;

        self.check_immutable_fields(cluster_name, &mut rendered).await?;

        if self.settings.dry_run_validation {
            self.backend
                .apply_cluster_instance(&rendered, true)
                .await
                .map_err(|e| StageError::from(e).context("dry-run validation failed"))?;
            debug!("ClusterInstance {} passed dry-run validation", cluster_name);
        }
        Ok(rendered)
    }

    /// Rejects edits to fields the install backend cannot change once
    /// installation has started, and keeps the manifests the applied
    /// instance suppresses.
    async fn check_immutable_fields(&self, cluster_name: &str, rendered: &mut Value) -> Result<(), StageError> {
        let Some(provisioned) = self.ledger.get(ConditionType::ClusterProvisioned) else {
            return Ok(());
        };
        if provisioned.status == ConditionStatus::Unknown {
            return Ok(());
        }
        let install_completed = provisioned.has_reason(ConditionReason::Completed);

        let Some(existing) = self.backend.get_cluster_instance(cluster_name, cluster_name).await? else {
            return Ok(());
        };
        let changes = immutable::diff(&existing.spec, descriptor::spec(rendered), install_completed);
        if !changes.scaling.is_empty() {
            info!("Node scaling requested for ClusterInstance {}: {}", cluster_name, changes.scaling.join(", "));
        }
        if changes.is_blocking() {
            return Err(StageError::input(format!(
                "detected changes in immutable fields: {}",
                changes.changed.join(", ")
            )));
        }

        let existing_suppressed = existing
            .spec
            .get("suppressedManifests")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_str);
        descriptor::add_suppressed_manifests(rendered, existing_suppressed);
        if changes.image_set_updated {
            info!("Image set of ClusterInstance {} changed, suppressing install manifests", cluster_name);
            descriptor::add_suppressed_manifests(rendered, descriptor::UPGRADE_SUPPRESSED_MANIFESTS);
        }
        Ok(())
    }
}

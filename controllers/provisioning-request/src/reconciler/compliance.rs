//! Configuration stage: policy compliance and ZTP status.

use super::ProvisioningTask;
use crate::compliance::{aggregate, ComplianceInput};
use crate::error::StageError;
use crate::requeue::Requeue;
use crds::{ConditionReason, ConditionType, ZtpStatus};
use tracing::{debug, info};

impl ProvisioningTask<'_> {
    /// Evaluates configuration once the cluster install has a verdict.
    pub(super) async fn handle_cluster_configuration(&mut self) -> Result<Requeue, StageError> {
        if !self.ledger.is_present(ConditionType::ClusterProvisioned) {
            // Rendering the install manifests is quick, check back soon
            let processing = self.ledger.is_present(ConditionType::ClusterInstanceProcessed)
                && !self.ledger.is_timed_out_or_failed(ConditionType::ClusterInstanceProcessed);
            return Ok(if processing { Requeue::Short } else { Requeue::Never });
        }
        if self.ledger.is_timed_out_or_failed(ConditionType::ClusterProvisioned) {
            return Ok(Requeue::Never);
        }

        let converging = self.update_configuration_applied().await?;
        let install_completed = self
            .ledger
            .has_reason(ConditionType::ClusterProvisioned, ConditionReason::Completed);
        Ok(if !install_completed || converging {
            Requeue::Long
        } else {
            Requeue::Never
        })
    }

    /// Records ConfigurationApplied. Returns true while policies are still
    /// converging.
    async fn update_configuration_applied(&mut self) -> Result<bool, StageError> {
        let Some(cluster_name) = self.extensions.cluster_details.as_ref().map(|d| d.name.clone()) else {
            return Ok(false);
        };

        let records = self.backend.list_policies(&cluster_name).await?;
        let cluster_ready = self
            .backend
            .get_managed_cluster(&cluster_name)
            .await?
            .is_some_and(|mc| mc.is_ready());

        let Some(details) = self.extensions.cluster_details.as_mut() else {
            return Ok(false);
        };
        let outcome = aggregate(&ComplianceInput {
            records: &records,
            cluster_ready,
            non_compliant_at: details.non_compliant_at,
            now: self.now,
            timeout: self.timeouts.cluster_configuration,
        });
        debug!("Cluster {} has {} policies", cluster_name, records.len());

        if self
            .ledger
            .set(ConditionType::ConfigurationApplied, outcome.reason, outcome.status, outcome.message, self.now)
        {
            info!("Configuration of cluster {}: {}", cluster_name, outcome.message);
        }
        details.non_compliant_at = outcome.non_compliant_at;
        details.ztp_status = if outcome.is_completed() || details.ztp_status == Some(ZtpStatus::Done) {
            Some(ZtpStatus::Done)
        } else {
            Some(ZtpStatus::NotDone)
        };
        self.extensions.policies = outcome.policies;
        Ok(outcome.requeue)
    }
}

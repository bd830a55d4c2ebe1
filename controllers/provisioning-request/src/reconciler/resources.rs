//! Cluster resources stage: namespace, pull secret and policy ConfigMap.

use super::ProvisioningTask;
use crate::error::StageError;
use crds::ConditionType;
use provisioning_backend::{ApplyOutcome, BackendError};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Suffix of the ConfigMap carrying the merged policy parameters
const POLICY_CONFIG_MAP_SUFFIX: &str = "-pg";

/// Prefix of the namespace policy ConfigMaps live in
const POLICY_NAMESPACE_PREFIX: &str = "ztp-";

impl ProvisioningTask<'_> {
    pub(super) async fn handle_cluster_resources(&mut self, rendered: &Value) -> Result<(), StageError> {
        let result = self.create_cluster_resources(rendered).await;
        self.record_stage(
            ConditionType::ClusterResourcesCreated,
            &result,
            "Cluster resources applied",
            "Failed to apply the required cluster resource",
        );
        result
    }

    async fn create_cluster_resources(&self, rendered: &Value) -> Result<(), StageError> {
        let cluster_name = self.cluster_name()?;
        let inputs = self.inputs()?;
        let labels = self.owner_labels();

        let outcome = self.backend.ensure_namespace(cluster_name, &labels).await?;
        log_outcome("Namespace", cluster_name, outcome);

        if let Some(secret) = rendered.pointer("/spec/pullSecretRef/name").and_then(Value::as_str) {
            match self.backend.copy_secret(&inputs.namespace, secret, cluster_name, &labels).await {
                Ok(outcome) => log_outcome("Secret", &format!("{cluster_name}/{secret}"), outcome),
                Err(BackendError::NotFound(_)) => {
                    return Err(StageError::input(format!(
                        "pull secret {secret} not found in namespace {}",
                        inputs.namespace
                    )));
                }
                Err(e) => return Err(e.into()),
            }
        }

        self.create_policy_config_map(cluster_name, &labels).await
    }

    /// Publishes the merged policy parameters for the policy engine.
    async fn create_policy_config_map(&self, cluster_name: &str, labels: &BTreeMap<String, String>) -> Result<(), StageError> {
        let inputs = self.inputs()?;
        let Some(policy) = inputs.policy_data.as_object().filter(|p| !p.is_empty()) else {
            return Ok(());
        };

        let data: BTreeMap<String, String> = policy
            .iter()
            .map(|(k, v)| {
                let value = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), value)
            })
            .collect();

        let namespace = format!("{POLICY_NAMESPACE_PREFIX}{}", inputs.namespace);
        let name = format!("{cluster_name}{POLICY_CONFIG_MAP_SUFFIX}");
        self.backend.ensure_namespace(&namespace, &BTreeMap::new()).await?;
        let outcome = self.backend.apply_config_map(&namespace, &name, &data, labels).await?;
        log_outcome("ConfigMap", &format!("{namespace}/{name}"), outcome);
        Ok(())
    }
}

fn log_outcome(kind: &str, name: &str, outcome: ApplyOutcome) {
    match outcome {
        ApplyOutcome::Created => info!("Created {} {}", kind, name),
        ApplyOutcome::Updated => info!("Updated {} {}", kind, name),
        ApplyOutcome::Unchanged => debug!("{} {} is up to date", kind, name),
    }
}

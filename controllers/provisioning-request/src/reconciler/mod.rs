//! ProvisioningRequest reconciliation.
//!
//! Each run builds a [`ProvisioningTask`] from the request as read at the
//! start of the run, drives it through the stage pipeline and commits the
//! resulting status once. Stage handlers live in submodules:
//! - `validation`: template lookup, schema checks, merges and timeouts
//! - `render`: ClusterInstance rendering, immutable checks and dry-run
//! - `resources`: cluster namespace, pull secret and policy ConfigMap
//! - `hardware`: NodeAllocationRequest submission and observation
//! - `cluster_install`: node back-fill, real apply and install tracking
//! - `compliance`: policy compliance and ZTP status

mod cluster_install;
mod compliance;
mod hardware;
mod render;
mod resources;
mod validation;


use crate::backoff::FibonacciBackoff;
use crate::conditions::ConditionLedger;
use crate::config::ControllerSettings;
use crate::error::{ControllerError, StageError};
use crate::requeue::Requeue;
use crate::timeouts::StageTimeouts;
use chrono::{DateTime, Utc};
use crds::{
    ClusterTemplate, Condition, ConditionReason, ConditionStatus, ConditionType, ProvisioningPhase,
    ProvisioningRequest, ProvisioningRequestStatus, ProvisioningStatus, StatusExtensions,
    PROVISIONING_REQUEST_NAME_LABEL, TEMPLATE_PARAM_CLUSTER_NAME,
};
use provisioning_backend::ProvisioningBackend;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const FULFILLED_DETAILS: &str = "Provisioning request has completed successfully";
pub const PENDING_DETAILS: &str = "Provisioning request has been accepted";

/// Backoff state for a resource
#[derive(Debug, Clone)]
struct BackoffState {
    backoff: FibonacciBackoff,
    error_count: u32,
}

/// Reconciles ProvisioningRequests.
pub struct Reconciler {
    pub(crate) backend: Arc<dyn ProvisioningBackend>,
    pub(crate) settings: ControllerSettings,
    /// Error count tracking per request name
    backoff_states: Mutex<HashMap<String, BackoffState>>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler").field("settings", &self.settings).finish_non_exhaustive()
    }
}

impl Reconciler {
    pub fn new(backend: Arc<dyn ProvisioningBackend>, settings: ControllerSettings) -> Self {
        Self {
            backend,
            settings,
            backoff_states: Mutex::new(HashMap::new()),
        }
    }

    /// Runs the pipeline for one ProvisioningRequest.
    pub async fn reconcile_provisioning_request(&self, request: &ProvisioningRequest) -> Result<Requeue, ControllerError> {
        self.reconcile_at(request, Utc::now()).await
    }

    /// Runs the pipeline with a fixed notion of "now".
    pub async fn reconcile_at(&self, request: &ProvisioningRequest, now: DateTime<Utc>) -> Result<Requeue, ControllerError> {
        let name = request
            .metadata
            .name
            .clone()
            .ok_or(ControllerError::MissingObjectKey("metadata.name"))?;
        info!("Reconciling ProvisioningRequest {}", name);

        let mut task = ProvisioningTask::new(self, request, name.clone(), now);
        let result = task.run().await;
        let status = task.into_status();

        if request.status.as_ref() != Some(&status) {
            self.backend.update_provisioning_request_status(&name, &status).await?;
            debug!("Updated status of ProvisioningRequest {}", name);
        }

        match result {
            Ok(requeue) => {
                info!("ProvisioningRequest {} reconciled (requeue: {:?})", name, requeue);
                Ok(requeue)
            }
            Err(StageError::Input(message)) => {
                warn!("ProvisioningRequest {} stopped on invalid input: {}", name, message);
                Ok(Requeue::Never)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Next retry delay after a failed reconciliation of `name`
    pub fn next_error_backoff(&self, name: &str) -> (Duration, u32) {
        let mut states = self.backoff_states.lock().unwrap_or_else(PoisonError::into_inner);
        let requeue = self.settings.requeue;
        let state = states.entry(name.to_string()).or_insert_with(|| BackoffState {
            backoff: FibonacciBackoff::new(requeue.short, requeue.long),
            error_count: 0,
        });
        state.error_count += 1;
        (state.backoff.next_backoff(), state.error_count)
    }

    /// Drops the error history of `name`, after a successful run or once
    /// the request is gone
    pub fn forget_backoff(&self, name: &str) {
        let mut states = self.backoff_states.lock().unwrap_or_else(PoisonError::into_inner);
        if states.remove(name).is_some() {
            debug!("Cleared error backoff for ProvisioningRequest {}", name);
        }
    }

    #[cfg(test)]
    fn tracked_backoffs(&self) -> usize {
        self.backoff_states.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Template data resolved by the validation stage
#[derive(Debug, Clone)]
pub(crate) struct TemplateInputs {
    pub(crate) template: ClusterTemplate,
    /// Namespace of the ClusterTemplate and its ConfigMaps
    pub(crate) namespace: String,
    /// Merged ClusterInstance document
    pub(crate) cluster_data: Value,
    /// Merged policy template document
    pub(crate) policy_data: Value,
    /// Data of the hardware template ConfigMap
    pub(crate) hardware_template: BTreeMap<String, String>,
}

/// State of one reconciliation run
pub(crate) struct ProvisioningTask<'a> {
    backend: &'a dyn ProvisioningBackend,
    settings: &'a ControllerSettings,
    request: &'a ProvisioningRequest,
    name: String,
    now: DateTime<Utc>,
    ledger: ConditionLedger,
    extensions: StatusExtensions,
    timeouts: StageTimeouts,
    inputs: Option<TemplateInputs>,
}

impl<'a> ProvisioningTask<'a> {
    fn new(reconciler: &'a Reconciler, request: &'a ProvisioningRequest, name: String, now: DateTime<Utc>) -> Self {
        let status = request.status.clone().unwrap_or_default();
        Self {
            backend: reconciler.backend.as_ref(),
            settings: &reconciler.settings,
            request,
            name,
            now,
            ledger: ConditionLedger::new(status.conditions),
            extensions: status.extensions,
            timeouts: StageTimeouts::default(),
            inputs: None,
        }
    }

    async fn run(&mut self) -> Result<Requeue, StageError> {
        if let Err(err) = self.handle_validation().await {
            return self.recover(err).await;
        }

        let rendered = match self.handle_render_cluster_instance().await {
            Ok(rendered) => rendered,
            Err(err) => return self.recover(err).await,
        };

        if let Err(err) = self.handle_cluster_resources(&rendered).await {
            if !err.is_input() {
                return Err(err);
            }
            // Likely fixed outside the request, e.g. a missing pull secret
            return Ok(self.check_cluster_deploy_config_state().await?.shortest(Requeue::Medium));
        }

        let allocation = match self.handle_render_hardware_template(&rendered) {
            Ok(allocation) => allocation,
            Err(err) => return self.recover(err).await,
        };
        self.create_node_allocation_request(&allocation).await?;

        let hardware = self.wait_for_hardware(&allocation.namespace, &allocation.name).await?;
        if hardware.timed_out_or_failed {
            return Ok(Requeue::Never);
        }
        if !hardware.provisioned {
            return Ok(Requeue::Medium);
        }

        self.handle_cluster_installation(rendered, &hardware.request).await?;
        self.handle_cluster_configuration().await
    }

    /// Input errors stop the pipeline for this run but stages that already
    /// made progress are still observed.
    async fn recover(&mut self, err: StageError) -> Result<Requeue, StageError> {
        if err.is_input() {
            self.check_cluster_deploy_config_state().await
        } else {
            Err(err)
        }
    }

    /// Re-observes hardware, cluster installation and configuration in that
    /// order, without touching anything the failed stage would have produced.
    async fn check_cluster_deploy_config_state(&mut self) -> Result<Requeue, StageError> {
        let Some(allocation) = self.extensions.node_allocation_request_ref.clone() else {
            return Ok(Requeue::Never);
        };
        debug!("Re-checking deployed state of ProvisioningRequest {}", self.name);

        let hardware = self.wait_for_hardware(&allocation.namespace, &allocation.name).await?;
        if hardware.timed_out_or_failed {
            return Ok(Requeue::Never);
        }
        if !hardware.provisioned {
            return Ok(Requeue::Medium);
        }

        if let Some(cluster_name) = self.extensions.cluster_details.as_ref().map(|d| d.name.clone()) {
            self.check_cluster_provision_status(&cluster_name).await?;
        }
        self.handle_cluster_configuration().await
    }

    /// Records the verdict of a stage.
    ///
    /// Transient failures only show up as InProgress on a stage that has
    /// no verdict yet; an existing verdict is left alone.
    fn record_stage<T>(&mut self, type_: ConditionType, result: &Result<T, StageError>, success: &str, failure: &str) {
        match result {
            Ok(_) => {
                self.ledger.set(type_, ConditionReason::Completed, ConditionStatus::True, success, self.now);
            }
            Err(StageError::Input(message)) => {
                warn!("{} failed for ProvisioningRequest {}: {}", type_, self.name, message);
                self.ledger.set(type_, ConditionReason::Failed, ConditionStatus::False, format!("{failure}: {message}"), self.now);
            }
            Err(StageError::Transient(message)) => {
                warn!("{} could not complete for ProvisioningRequest {}: {}", type_, self.name, message);
                if !self.ledger.is_present(type_) {
                    self.ledger.set(type_, ConditionReason::InProgress, ConditionStatus::Unknown, format!("{failure}: {message}"), self.now);
                }
            }
        }
    }

    fn inputs(&self) -> Result<&TemplateInputs, StageError> {
        self.inputs
            .as_ref()
            .ok_or_else(|| StageError::transient("template inputs have not been resolved"))
    }

    fn cluster_name(&self) -> Result<&'a str, StageError> {
        self.request
            .spec
            .string_parameter(TEMPLATE_PARAM_CLUSTER_NAME)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| StageError::input(format!("templateParameters.{TEMPLATE_PARAM_CLUSTER_NAME} must be provided")))
    }

    /// Labels tying child resources back to this request
    fn owner_labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([(PROVISIONING_REQUEST_NAME_LABEL.to_string(), self.name.clone())])
    }

    async fn load_config_map(&self, namespace: &str, name: &str) -> Result<BTreeMap<String, String>, StageError> {
        self.backend
            .get_config_map(namespace, name)
            .await?
            .ok_or_else(|| StageError::input(format!("failed to get ConfigMap {namespace}/{name}: not found")))
    }

    fn into_status(self) -> ProvisioningRequestStatus {
        let previous = self.request.status.as_ref().and_then(|s| s.provisioning_status.as_ref());
        let provisioning_status = derive_provisioning_status(&self.ledger, previous, self.now);
        ProvisioningRequestStatus {
            conditions: self.ledger.into_inner(),
            provisioning_status: Some(provisioning_status),
            observed_generation: self.request.metadata.generation,
            extensions: self.extensions,
        }
    }
}

/// Derives the overall phase from the stage conditions.
///
/// `updateTime` only moves when the phase or its details change.
pub(crate) fn derive_provisioning_status(
    ledger: &ConditionLedger,
    previous: Option<&ProvisioningStatus>,
    now: DateTime<Utc>,
) -> ProvisioningStatus {
    let terminal = ledger
        .iter()
        .find(|c| c.has_reason(ConditionReason::Failed) || c.has_reason(ConditionReason::TimedOut));

    let (phase, details) = if let Some(condition) = terminal {
        (ProvisioningPhase::Failed, condition.message.clone())
    } else if ledger.has_reason(ConditionType::ConfigurationApplied, ConditionReason::Completed)
        && ledger.has_reason(ConditionType::ClusterProvisioned, ConditionReason::Completed)
    {
        (ProvisioningPhase::Fulfilled, FULFILLED_DETAILS.to_string())
    } else if !ledger.iter().any(Condition::is_true) {
        (ProvisioningPhase::Pending, PENDING_DETAILS.to_string())
    } else {
        let details = ledger
            .iter()
            .filter(|c| !c.is_true())
            .last()
            .or_else(|| ledger.iter().last())
            .map(|c| c.message.clone())
            .unwrap_or_default();
        (ProvisioningPhase::Progressing, details)
    };

    let update_time = match previous {
        Some(p) if p.provisioning_phase == phase && p.provisioning_details == details => p.update_time,
        _ => Some(now),
    };
    ProvisioningStatus {
        provisioning_phase: phase,
        provisioning_details: details,
        update_time,
    }
}

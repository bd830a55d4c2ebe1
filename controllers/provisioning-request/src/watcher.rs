//! Kubernetes resource watchers.
//!
//! ProvisioningRequests are reconciled through `kube_runtime::Controller`.
//! ClusterInstances and NodeAllocationRequests carry the owning request's
//! name as a label, so changes to them re-trigger that request.

use crate::config::ControllerSettings;
use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crds::{ProvisioningRequest, PROVISIONING_REQUEST_NAME_LABEL};
use futures::StreamExt;
use kube::api::DynamicObject;
use kube::{Api, Client, ResourceExt};
use kube_runtime::controller::{self, Action, Config as ControllerConfig};
use kube_runtime::reflector::ObjectRef;
use kube_runtime::{watcher, Controller};
use provisioning_backend::client::{cluster_instance_resource, node_allocation_request_resource};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Maps a labelled child resource back to its ProvisioningRequest
fn owning_request(obj: DynamicObject) -> Option<ObjectRef<ProvisioningRequest>> {
    obj.labels()
        .get(PROVISIONING_REQUEST_NAME_LABEL)
        .map(|name| ObjectRef::new(name))
}

async fn reconcile(request: Arc<ProvisioningRequest>, reconciler: Arc<Reconciler>) -> Result<Action, ControllerError> {
    let name = request.name_any();
    if request.metadata.deletion_timestamp.is_some() {
        debug!("ProvisioningRequest {} is being deleted", name);
        reconciler.forget_backoff(&name);
        return Ok(Action::await_change());
    }
    debug!("Reconciling ProvisioningRequest {}", name);

    let requeue = reconciler.reconcile_provisioning_request(&request).await?;
    reconciler.forget_backoff(&name);
    Ok(requeue.to_action(&reconciler.settings.requeue))
}

fn error_policy(request: Arc<ProvisioningRequest>, error: &ControllerError, reconciler: Arc<Reconciler>) -> Action {
    let name = request.name_any();
    let (delay, attempts) = reconciler.next_error_backoff(&name);
    error!(
        "Reconciliation error for ProvisioningRequest {} (attempt {}), retrying in {:?}: {}",
        name, attempts, delay, error
    );
    Action::requeue(delay)
}

/// Watches Kubernetes resources for changes.
pub struct Watcher {
    reconciler: Arc<Reconciler>,
    client: Client,
    settings: ControllerSettings,
}

impl Watcher {
    pub fn new(reconciler: Arc<Reconciler>, client: Client, settings: ControllerSettings) -> Self {
        Self {
            reconciler,
            client,
            settings,
        }
    }

    /// Watches ProvisioningRequests and the child resources they own.
    pub async fn watch_provisioning_requests(&self) -> Result<(), ControllerError> {
        info!("Starting ProvisioningRequest watcher");

        let requests: Api<ProvisioningRequest> = Api::all(self.client.clone());
        let cluster_instances_ar = cluster_instance_resource();
        let cluster_instances: Api<DynamicObject> = Api::all_with(self.client.clone(), &cluster_instances_ar);
        let allocations_ar = node_allocation_request_resource();
        let allocations: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), &self.settings.hardware_namespace, &allocations_ar);

        let owned = watcher::Config::default().labels(PROVISIONING_REQUEST_NAME_LABEL);
        let controller_config = ControllerConfig::default()
            .debounce(self.settings.debounce)
            .concurrency(self.settings.concurrency);

        Controller::new(requests, watcher::Config::default())
            .watches_with(cluster_instances, cluster_instances_ar, owned.clone(), owning_request)
            .watches_with(allocations, allocations_ar, owned, owning_request)
            .with_config(controller_config)
            .shutdown_on_signal()
            .run(reconcile, error_policy, self.reconciler.clone())
            .for_each(|res| {
                let reconciler = self.reconciler.clone();
                async move {
                    match res {
                        Ok((obj, _)) => debug!("Reconciled ProvisioningRequest {}", obj.name),
                        // A retry found the request deleted
                        Err(controller::Error::ObjectNotFound(obj)) => {
                            debug!("ProvisioningRequest {} no longer exists", obj.name);
                            reconciler.forget_backoff(&obj.name);
                        }
                        Err(e) => warn!("ProvisioningRequest controller error: {}", e),
                    }
                }
            })
            .await;

        info!("ProvisioningRequest watcher stopped");
        Ok(())
    }
}

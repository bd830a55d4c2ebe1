//! Main controller implementation.
//!
//! This module contains the `Controller` struct that wires the Kubernetes
//! backend, the reconciler and the ProvisioningRequest watcher together.

use crate::config::ControllerSettings;
use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crate::watcher::Watcher;
use kube::Client;
use provisioning_backend::KubeBackend;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Main controller for ProvisioningRequests.
pub struct Controller {
    provisioning_request_watcher: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    /// Creates a new controller instance and starts watching.
    pub async fn new(settings: ControllerSettings) -> Result<Self, ControllerError> {
        info!("Initializing ProvisioningRequest Controller");

        let client = Client::try_default().await?;
        let backend = KubeBackend::new(client.clone(), settings.watch_namespace.clone());
        let reconciler = Arc::new(Reconciler::new(Arc::new(backend), settings.clone()));

        let watcher = Watcher::new(reconciler, client, settings);
        let provisioning_request_watcher = tokio::spawn(async move { watcher.watch_provisioning_requests().await });

        Ok(Self {
            provisioning_request_watcher,
        })
    }

    /// Runs the controller until shutdown.
    pub async fn run(self) -> Result<(), ControllerError> {
        info!("ProvisioningRequest Controller running");

        self.provisioning_request_watcher
            .await
            .map_err(|e| ControllerError::Watch(format!("ProvisioningRequest watcher panicked: {}", e)))??;

        info!("ProvisioningRequest Controller stopped");
        Ok(())
    }
}

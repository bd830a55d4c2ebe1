//! ProvisioningRequest Controller
//!
//! Drives each ProvisioningRequest through its provisioning pipeline:
//! - Validation of the request against its ClusterTemplate
//! - Rendering and dry-run of the ClusterInstance descriptor
//! - Hardware allocation through a NodeAllocationRequest
//! - Cluster installation and policy compliance tracking
//!
//! All progress is reported as conditions on the ProvisioningRequest status.

mod backoff;
mod compliance;
mod conditions;
mod config;
mod controller;
mod descriptor;
mod error;
mod hardware;
mod immutable;
mod merge;
mod reconciler;
mod requeue;
mod schema;
mod template_params;
mod timeouts;
mod watcher;
#[cfg(test)]
mod test_utils;

use crate::config::ControllerSettings;
use crate::error::ControllerError;
use controller::Controller;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // kube's rustls client needs a process-wide crypto provider
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        info!("rustls crypto provider already installed");
    }

    info!("Starting ProvisioningRequest Controller");

    let settings = ControllerSettings::from_env()?;

    info!("Configuration:");
    info!("  Template namespace: {}", settings.watch_namespace.as_deref().unwrap_or("all namespaces"));
    info!("  Hardware namespace: {}", settings.hardware_namespace);
    info!(
        "  Requeue intervals: short={:?} medium={:?} long={:?}",
        settings.requeue.short, settings.requeue.medium, settings.requeue.long
    );
    info!("  Concurrency: {}, debounce: {:?}", settings.concurrency, settings.debounce);

    let controller = Controller::new(settings).await?;
    controller.run().await?;

    Ok(())
}

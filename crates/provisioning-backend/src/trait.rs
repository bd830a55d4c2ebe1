//! ProvisioningBackend trait for mocking
//!
//! This trait abstracts every collaborator the orchestrator calls so the
//! reconciler can run against [`crate::KubeBackend`] in production and an
//! in-memory mock in unit tests.

use crate::error::BackendError;
use crate::models::*;
use crds::{ClusterTemplate, ProvisioningRequestStatus};
use std::collections::BTreeMap;

/// Collaborator operations used by the provisioning orchestrator
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
/// Lookups return `Ok(None)` when the object does not exist; writes are
/// idempotent (create-if-absent, update-if-different).
#[async_trait::async_trait]
pub trait ProvisioningBackend: Send + Sync {
    // Resource store
    async fn find_cluster_template(&self, name: &str) -> Result<Option<ClusterTemplate>, BackendError>;
    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<Option<BTreeMap<String, String>>, BackendError>;
    async fn ensure_namespace(&self, name: &str, labels: &BTreeMap<String, String>) -> Result<ApplyOutcome, BackendError>;
    async fn copy_secret(&self, source_namespace: &str, name: &str, target_namespace: &str, labels: &BTreeMap<String, String>) -> Result<ApplyOutcome, BackendError>;
    async fn apply_config_map(&self, namespace: &str, name: &str, data: &BTreeMap<String, String>, labels: &BTreeMap<String, String>) -> Result<ApplyOutcome, BackendError>;
    async fn update_provisioning_request_status(&self, name: &str, status: &ProvisioningRequestStatus) -> Result<(), BackendError>;

    // Cluster-install backend
    async fn get_cluster_instance(&self, namespace: &str, name: &str) -> Result<Option<ClusterInstance>, BackendError>;
    /// Creates the descriptor or replaces its spec when it differs.
    ///
    /// With `dry_run` the backend performs full validation without persisting.
    /// A rejected descriptor is reported as [`BackendError::Invalid`].
    async fn apply_cluster_instance(&self, descriptor: &serde_json::Value, dry_run: bool) -> Result<ApplyOutcome, BackendError>;

    // Hardware backend
    async fn get_node_allocation_request(&self, namespace: &str, name: &str) -> Result<Option<NodeAllocationRequest>, BackendError>;
    /// Creates the request or patches its node groups when they differ.
    async fn apply_node_allocation_request(&self, request: &NodeAllocationRequest) -> Result<ApplyOutcome, BackendError>;
    async fn list_allocated_nodes(&self, namespace: &str, request_name: &str) -> Result<Vec<AllocatedNode>, BackendError>;

    // Compliance backend
    async fn list_policies(&self, cluster_namespace: &str) -> Result<Vec<PolicyRecord>, BackendError>;
    async fn get_managed_cluster(&self, name: &str) -> Result<Option<ManagedClusterStatus>, BackendError>;
}

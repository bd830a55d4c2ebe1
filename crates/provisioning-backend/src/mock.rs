//! Mock ProvisioningBackend for unit testing
//!
//! This module provides an in-memory implementation of [`ProvisioningBackend`]
//! so reconciler tests can run without a Kubernetes API server. Test setup
//! seeds templates, ConfigMaps and collaborator status; assertions read back
//! what the orchestrator wrote.

use crate::backend_trait::ProvisioningBackend;
use crate::error::BackendError;
use crate::models::*;
use crds::{ClusterTemplate, Condition, ProvisioningRequestStatus};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type Key = (String, String);

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Mock backend for testing
///
/// Clones share the same in-memory state.
#[derive(Clone, Default)]
pub struct MockBackend {
    templates: Arc<Mutex<HashMap<String, ClusterTemplate>>>,
    config_maps: Arc<Mutex<HashMap<Key, BTreeMap<String, String>>>>,
    namespaces: Arc<Mutex<HashMap<String, BTreeMap<String, String>>>>,
    secrets: Arc<Mutex<HashMap<Key, BTreeMap<String, String>>>>,
    statuses: Arc<Mutex<HashMap<String, ProvisioningRequestStatus>>>,
    status_writes: Arc<Mutex<usize>>,
    cluster_instances: Arc<Mutex<HashMap<Key, ClusterInstance>>>,
    dry_run_rejection: Arc<Mutex<Option<String>>>,
    dry_runs: Arc<Mutex<usize>>,
    node_allocation_requests: Arc<Mutex<HashMap<Key, NodeAllocationRequest>>>,
    allocated_nodes: Arc<Mutex<HashMap<Key, Vec<AllocatedNode>>>>,
    policies: Arc<Mutex<HashMap<String, Vec<PolicyRecord>>>>,
    managed_clusters: Arc<Mutex<HashMap<String, ManagedClusterStatus>>>,
    failures: Arc<Mutex<HashMap<&'static str, String>>>,
}

impl std::fmt::Debug for MockBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockBackend").finish_non_exhaustive()
    }
}

impl MockBackend {
    /// Create an empty mock backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a ClusterTemplate (for test setup)
    pub fn add_cluster_template(&self, template: ClusterTemplate) {
        let name = template.metadata.name.clone().unwrap_or_default();
        lock(&self.templates).insert(name, template);
    }

    /// Add a ConfigMap (for test setup)
    pub fn add_config_map(&self, namespace: &str, name: &str, data: BTreeMap<String, String>) {
        lock(&self.config_maps).insert(key(namespace, name), data);
    }

    /// Add a secret that can be copied (for test setup)
    pub fn add_secret(&self, namespace: &str, name: &str) {
        lock(&self.secrets).insert(key(namespace, name), BTreeMap::new());
    }

    /// Make every dry-run apply fail with an invalid-object error
    pub fn reject_dry_run(&self, message: impl Into<String>) {
        *lock(&self.dry_run_rejection) = Some(message.into());
    }

    /// Make the named trait operation fail with [`BackendError::Unavailable`]
    pub fn fail_operation(&self, operation: &'static str, message: impl Into<String>) {
        lock(&self.failures).insert(operation, message.into());
    }

    /// Clear a failure installed with [`MockBackend::fail_operation`]
    pub fn clear_failure(&self, operation: &'static str) {
        lock(&self.failures).remove(operation);
    }

    /// Set the conditions the hardware plugin reports on a NodeAllocationRequest
    pub fn set_node_allocation_conditions(&self, namespace: &str, name: &str, conditions: Vec<Condition>) {
        if let Some(request) = lock(&self.node_allocation_requests).get_mut(&key(namespace, name)) {
            request.conditions = conditions;
        }
    }

    /// Add nodes allocated for a NodeAllocationRequest (for test setup)
    pub fn set_allocated_nodes(&self, namespace: &str, request_name: &str, nodes: Vec<AllocatedNode>) {
        lock(&self.allocated_nodes).insert(key(namespace, request_name), nodes);
    }

    /// Set the conditions the install backend reports on a ClusterInstance
    pub fn set_cluster_instance_conditions(&self, namespace: &str, name: &str, conditions: Vec<Condition>) {
        if let Some(ci) = lock(&self.cluster_instances).get_mut(&key(namespace, name)) {
            ci.conditions = conditions;
        }
    }

    /// Set a top-level spec field on a stored ClusterInstance, as an out-of-band edit would
    pub fn set_cluster_instance_spec_field(&self, namespace: &str, name: &str, field: &str, value: serde_json::Value) {
        if let Some(spec) = lock(&self.cluster_instances)
            .get_mut(&key(namespace, name))
            .and_then(|ci| ci.spec.as_object_mut())
        {
            spec.insert(field.to_string(), value);
        }
    }

    /// Set the policies observed in a cluster namespace
    pub fn set_policies(&self, cluster_namespace: &str, policies: Vec<PolicyRecord>) {
        lock(&self.policies).insert(cluster_namespace.to_string(), policies);
    }

    /// Set the ManagedCluster status for a cluster
    pub fn set_managed_cluster(&self, name: &str, status: ManagedClusterStatus) {
        lock(&self.managed_clusters).insert(name.to_string(), status);
    }

    /// Last status written for a ProvisioningRequest
    pub fn status(&self, name: &str) -> Option<ProvisioningRequestStatus> {
        lock(&self.statuses).get(name).cloned()
    }

    /// Number of status writes performed
    pub fn status_writes(&self) -> usize {
        *lock(&self.status_writes)
    }

    /// Number of dry-run applies performed
    pub fn dry_runs(&self) -> usize {
        *lock(&self.dry_runs)
    }

    /// Stored ClusterInstance
    pub fn cluster_instance(&self, namespace: &str, name: &str) -> Option<ClusterInstance> {
        lock(&self.cluster_instances).get(&key(namespace, name)).cloned()
    }

    /// Stored NodeAllocationRequest
    pub fn node_allocation_request(&self, namespace: &str, name: &str) -> Option<NodeAllocationRequest> {
        lock(&self.node_allocation_requests).get(&key(namespace, name)).cloned()
    }

    /// Returns true if the namespace was created
    pub fn has_namespace(&self, name: &str) -> bool {
        lock(&self.namespaces).contains_key(name)
    }

    /// Returns true if the secret exists
    pub fn has_secret(&self, namespace: &str, name: &str) -> bool {
        lock(&self.secrets).contains_key(&key(namespace, name))
    }

    /// Stored ConfigMap data
    pub fn config_map(&self, namespace: &str, name: &str) -> Option<BTreeMap<String, String>> {
        lock(&self.config_maps).get(&key(namespace, name)).cloned()
    }

    fn check(&self, operation: &'static str) -> Result<(), BackendError> {
        match lock(&self.failures).get(operation) {
            Some(message) => Err(BackendError::Unavailable(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl ProvisioningBackend for MockBackend {
    async fn find_cluster_template(&self, name: &str) -> Result<Option<ClusterTemplate>, BackendError> {
        self.check("find_cluster_template")?;
        Ok(lock(&self.templates).get(name).cloned())
    }

    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<Option<BTreeMap<String, String>>, BackendError> {
        self.check("get_config_map")?;
        Ok(self.config_map(namespace, name))
    }

    async fn ensure_namespace(&self, name: &str, labels: &BTreeMap<String, String>) -> Result<ApplyOutcome, BackendError> {
        self.check("ensure_namespace")?;
        let mut namespaces = lock(&self.namespaces);
        if namespaces.contains_key(name) {
            return Ok(ApplyOutcome::Unchanged);
        }
        namespaces.insert(name.to_string(), labels.clone());
        Ok(ApplyOutcome::Created)
    }

    async fn copy_secret(
        &self,
        source_namespace: &str,
        name: &str,
        target_namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<ApplyOutcome, BackendError> {
        self.check("copy_secret")?;
        let mut secrets = lock(&self.secrets);
        if secrets.contains_key(&key(target_namespace, name)) {
            return Ok(ApplyOutcome::Unchanged);
        }
        if !secrets.contains_key(&key(source_namespace, name)) {
            return Err(BackendError::NotFound(format!("secret {source_namespace}/{name}")));
        }
        secrets.insert(key(target_namespace, name), labels.clone());
        Ok(ApplyOutcome::Created)
    }

    async fn apply_config_map(
        &self,
        namespace: &str,
        name: &str,
        data: &BTreeMap<String, String>,
        _labels: &BTreeMap<String, String>,
    ) -> Result<ApplyOutcome, BackendError> {
        self.check("apply_config_map")?;
        let previous = lock(&self.config_maps).insert(key(namespace, name), data.clone());
        Ok(match previous {
            None => ApplyOutcome::Created,
            Some(old) if &old == data => ApplyOutcome::Unchanged,
            Some(_) => ApplyOutcome::Updated,
        })
    }

    async fn update_provisioning_request_status(&self, name: &str, status: &ProvisioningRequestStatus) -> Result<(), BackendError> {
        self.check("update_provisioning_request_status")?;
        lock(&self.statuses).insert(name.to_string(), status.clone());
        *lock(&self.status_writes) += 1;
        Ok(())
    }

    async fn get_cluster_instance(&self, namespace: &str, name: &str) -> Result<Option<ClusterInstance>, BackendError> {
        self.check("get_cluster_instance")?;
        Ok(self.cluster_instance(namespace, name))
    }

    async fn apply_cluster_instance(&self, descriptor: &serde_json::Value, dry_run: bool) -> Result<ApplyOutcome, BackendError> {
        self.check("apply_cluster_instance")?;
        let name = descriptor.pointer("/metadata/name").and_then(serde_json::Value::as_str).unwrap_or_default();
        let namespace = descriptor.pointer("/metadata/namespace").and_then(serde_json::Value::as_str).unwrap_or_default();
        let spec = descriptor.get("spec").cloned().unwrap_or(serde_json::Value::Null);

        if dry_run {
            *lock(&self.dry_runs) += 1;
            if let Some(message) = lock(&self.dry_run_rejection).clone() {
                return Err(BackendError::Invalid(message));
            }
        }

        let mut instances = lock(&self.cluster_instances);
        let outcome = match instances.get(&key(namespace, name)) {
            None => ApplyOutcome::Created,
            Some(existing) if existing.spec == spec => ApplyOutcome::Unchanged,
            Some(_) => ApplyOutcome::Updated,
        };
        if !dry_run && outcome != ApplyOutcome::Unchanged {
            let conditions = instances
                .get(&key(namespace, name))
                .map(|ci| ci.conditions.clone())
                .unwrap_or_default();
            instances.insert(
                key(namespace, name),
                ClusterInstance {
                    name: name.to_string(),
                    namespace: namespace.to_string(),
                    spec,
                    conditions,
                },
            );
        }
        Ok(outcome)
    }

    async fn get_node_allocation_request(&self, namespace: &str, name: &str) -> Result<Option<NodeAllocationRequest>, BackendError> {
        self.check("get_node_allocation_request")?;
        Ok(self.node_allocation_request(namespace, name))
    }

    async fn apply_node_allocation_request(&self, request: &NodeAllocationRequest) -> Result<ApplyOutcome, BackendError> {
        self.check("apply_node_allocation_request")?;
        let mut requests = lock(&self.node_allocation_requests);
        match requests.get_mut(&key(&request.namespace, &request.name)) {
            None => {
                let mut stored = request.clone();
                stored.conditions.clear();
                requests.insert(key(&request.namespace, &request.name), stored);
                Ok(ApplyOutcome::Created)
            }
            Some(existing) if existing.spec.node_group == request.spec.node_group => Ok(ApplyOutcome::Unchanged),
            Some(existing) => {
                existing.spec = request.spec.clone();
                Ok(ApplyOutcome::Updated)
            }
        }
    }

    async fn list_allocated_nodes(&self, namespace: &str, request_name: &str) -> Result<Vec<AllocatedNode>, BackendError> {
        self.check("list_allocated_nodes")?;
        Ok(lock(&self.allocated_nodes)
            .get(&key(namespace, request_name))
            .cloned()
            .unwrap_or_default())
    }

    async fn list_policies(&self, cluster_namespace: &str) -> Result<Vec<PolicyRecord>, BackendError> {
        self.check("list_policies")?;
        Ok(lock(&self.policies).get(cluster_namespace).cloned().unwrap_or_default())
    }

    async fn get_managed_cluster(&self, name: &str) -> Result<Option<ManagedClusterStatus>, BackendError> {
        self.check("get_managed_cluster")?;
        Ok(lock(&self.managed_clusters).get(name).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_apply_cluster_instance_is_idempotent() {
        let backend = MockBackend::new();
        let descriptor = serde_json::json!({
            "metadata": { "name": "site-1", "namespace": "site-1" },
            "spec": { "clusterName": "site-1" }
        });
        assert_eq!(backend.apply_cluster_instance(&descriptor, false).await.unwrap(), ApplyOutcome::Created);
        assert_eq!(backend.apply_cluster_instance(&descriptor, false).await.unwrap(), ApplyOutcome::Unchanged);
        assert!(backend.cluster_instance("site-1", "site-1").is_some());
    }

    #[tokio::test]
    async fn test_dry_run_does_not_persist() {
        let backend = MockBackend::new();
        let descriptor = serde_json::json!({
            "metadata": { "name": "site-1", "namespace": "site-1" },
            "spec": {}
        });
        backend.apply_cluster_instance(&descriptor, true).await.unwrap();
        assert!(backend.cluster_instance("site-1", "site-1").is_none());
        assert_eq!(backend.dry_runs(), 1);

        backend.reject_dry_run("spec.baseDomain: Required value");
        let err = backend.apply_cluster_instance(&descriptor, true).await.unwrap_err();
        assert!(err.is_invalid());
    }

    #[tokio::test]
    async fn test_copy_secret_requires_source() {
        let backend = MockBackend::new();
        let labels = BTreeMap::new();
        let err = backend.copy_secret("templates", "pull-secret", "site-1", &labels).await.unwrap_err();
        assert!(matches!(err, BackendError::NotFound(_)));

        backend.add_secret("templates", "pull-secret");
        assert_eq!(
            backend.copy_secret("templates", "pull-secret", "site-1", &labels).await.unwrap(),
            ApplyOutcome::Created
        );
        assert!(backend.has_secret("site-1", "pull-secret"));
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let backend = MockBackend::new();
        backend.fail_operation("list_policies", "connection refused");
        assert!(backend.list_policies("site-1").await.is_err());
        backend.clear_failure("list_policies");
        assert!(backend.list_policies("site-1").await.unwrap().is_empty());
    }
}

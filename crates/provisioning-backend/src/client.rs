//! Kubernetes-backed implementation of [`ProvisioningBackend`].
//!
//! Typed APIs are used for core resources and our own CRDs. Collaborator CRDs
//! (ClusterInstance, NodeAllocationRequest, AllocatedNode, Policy,
//! ManagedCluster) are accessed as `DynamicObject`s so this crate does not
//! depend on their generated types.

use crate::backend_trait::ProvisioningBackend;
use crate::error::BackendError;
use crate::models::*;
use crds::{ClusterTemplate, Condition, ProvisioningRequest, ProvisioningRequestStatus};
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DynamicObject, ListParams, Patch, PatchParams, PostParams};
use kube::discovery::ApiResource;
use kube::Client;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Field manager recorded on every write
pub const FIELD_MANAGER: &str = "provisioning-request-controller";

/// Label linking an AllocatedNode to its NodeAllocationRequest
pub const ALLOCATED_NODE_REQUEST_LABEL: &str = "o2ims-hardwaremanagement.oran.openshift.io/node-allocation-request";

fn api_resource(group: &str, version: &str, kind: &str, plural: &str) -> ApiResource {
    ApiResource {
        group: group.to_string(),
        version: version.to_string(),
        api_version: format!("{group}/{version}"),
        kind: kind.to_string(),
        plural: plural.to_string(),
    }
}

/// ApiResource for the cluster-install backend's ClusterInstance
pub fn cluster_instance_resource() -> ApiResource {
    api_resource("siteconfig.open-cluster-management.io", "v1alpha1", "ClusterInstance", "clusterinstances")
}

/// ApiResource for the hardware backend's NodeAllocationRequest
pub fn node_allocation_request_resource() -> ApiResource {
    api_resource("o2ims-hardwaremanagement.oran.openshift.io", "v1alpha1", "NodeAllocationRequest", "nodeallocationrequests")
}

fn allocated_node_resource() -> ApiResource {
    api_resource("o2ims-hardwaremanagement.oran.openshift.io", "v1alpha1", "AllocatedNode", "allocatednodes")
}

fn policy_resource() -> ApiResource {
    api_resource("policy.open-cluster-management.io", "v1", "Policy", "policies")
}

fn managed_cluster_resource() -> ApiResource {
    api_resource("cluster.open-cluster-management.io", "v1", "ManagedCluster", "managedclusters")
}

fn str_at<'a>(value: &'a Value, pointer: &str) -> &'a str {
    value.pointer(pointer).and_then(Value::as_str).unwrap_or_default()
}

fn conditions_from(data: &Value) -> Result<Vec<Condition>, BackendError> {
    match data.pointer("/status/conditions") {
        Some(raw) if !raw.is_null() => Ok(serde_json::from_value(raw.clone())?),
        _ => Ok(Vec::new()),
    }
}

fn node_allocation_request_from(obj: DynamicObject) -> Result<NodeAllocationRequest, BackendError> {
    let spec = match obj.data.get("spec") {
        Some(raw) => serde_json::from_value(raw.clone())?,
        None => NodeAllocationRequestSpec::default(),
    };
    Ok(NodeAllocationRequest {
        conditions: conditions_from(&obj.data)?,
        name: obj.metadata.name.unwrap_or_default(),
        namespace: obj.metadata.namespace.unwrap_or_default(),
        labels: obj.metadata.labels.unwrap_or_default(),
        spec,
    })
}

fn allocated_node_from(obj: &DynamicObject) -> Result<AllocatedNode, BackendError> {
    let interfaces = match obj.data.pointer("/status/interfaces") {
        Some(raw) if !raw.is_null() => serde_json::from_value(raw.clone())?,
        _ => Vec::new(),
    };
    Ok(AllocatedNode {
        name: obj.metadata.name.clone().unwrap_or_default(),
        group_name: str_at(&obj.data, "/spec/groupName").to_string(),
        bmc_address: str_at(&obj.data, "/status/bmc/address").to_string(),
        bmc_credentials_name: str_at(&obj.data, "/status/bmc/credentialsName").to_string(),
        interfaces,
    })
}

fn policy_from(obj: &DynamicObject) -> PolicyRecord {
    PolicyRecord {
        name: obj.metadata.name.clone().unwrap_or_default(),
        namespace: obj.metadata.namespace.clone().unwrap_or_default(),
        remediation_action: RemediationAction::parse(str_at(&obj.data, "/spec/remediationAction"))
            .unwrap_or(RemediationAction::Inform),
        compliance_state: ComplianceState::parse(str_at(&obj.data, "/status/compliant")),
    }
}

/// Kubernetes-backed collaborator implementation
#[derive(Clone)]
pub struct KubeBackend {
    client: Client,
    template_namespace: Option<String>,
}

impl std::fmt::Debug for KubeBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeBackend")
            .field("template_namespace", &self.template_namespace)
            .finish_non_exhaustive()
    }
}

impl KubeBackend {
    /// Creates a backend. ClusterTemplates are looked up in `template_namespace`,
    /// or in all namespaces when `None`.
    pub fn new(client: Client, template_namespace: Option<String>) -> Self {
        Self {
            client,
            template_namespace,
        }
    }

    fn dynamic_api(&self, namespace: &str, ar: &ApiResource) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, ar)
    }
}

#[async_trait::async_trait]
impl ProvisioningBackend for KubeBackend {
    async fn find_cluster_template(&self, name: &str) -> Result<Option<ClusterTemplate>, BackendError> {
        let api: Api<ClusterTemplate> = match &self.template_namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };
        let lp = ListParams::default().fields(&format!("metadata.name={name}"));
        let list = api.list(&lp).await.map_err(BackendError::from_kube)?;
        Ok(list.items.into_iter().next())
    }

    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<Option<BTreeMap<String, String>>, BackendError> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        let cm = api.get_opt(name).await.map_err(BackendError::from_kube)?;
        Ok(cm.map(|cm| cm.data.unwrap_or_default()))
    }

    async fn ensure_namespace(&self, name: &str, labels: &BTreeMap<String, String>) -> Result<ApplyOutcome, BackendError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        if api.get_opt(name).await.map_err(BackendError::from_kube)?.is_some() {
            return Ok(ApplyOutcome::Unchanged);
        }
        let ns = Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(labels.clone()),
                ..Default::default()
            },
            ..Default::default()
        };
        match api.create(&PostParams::default(), &ns).await {
            Ok(_) => {
                info!("Created namespace {}", name);
                Ok(ApplyOutcome::Created)
            }
            Err(kube::Error::Api(ae)) if ae.code == 409 => Ok(ApplyOutcome::Unchanged),
            Err(e) => Err(BackendError::from_kube(e)),
        }
    }

    async fn copy_secret(
        &self,
        source_namespace: &str,
        name: &str,
        target_namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<ApplyOutcome, BackendError> {
        let source_api: Api<Secret> = Api::namespaced(self.client.clone(), source_namespace);
        let target_api: Api<Secret> = Api::namespaced(self.client.clone(), target_namespace);

        if target_api.get_opt(name).await.map_err(BackendError::from_kube)?.is_some() {
            return Ok(ApplyOutcome::Unchanged);
        }
        let source = source_api
            .get_opt(name)
            .await
            .map_err(BackendError::from_kube)?
            .ok_or_else(|| BackendError::NotFound(format!("secret {source_namespace}/{name}")))?;

        let copy = Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(target_namespace.to_string()),
                labels: Some(labels.clone()),
                ..Default::default()
            },
            data: source.data,
            type_: source.type_,
            ..Default::default()
        };
        match target_api.create(&PostParams::default(), &copy).await {
            Ok(_) => Ok(ApplyOutcome::Created),
            Err(kube::Error::Api(ae)) if ae.code == 409 => Ok(ApplyOutcome::Unchanged),
            Err(e) => Err(BackendError::from_kube(e)),
        }
    }

    async fn apply_config_map(
        &self,
        namespace: &str,
        name: &str,
        data: &BTreeMap<String, String>,
        labels: &BTreeMap<String, String>,
    ) -> Result<ApplyOutcome, BackendError> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        match api.get_opt(name).await.map_err(BackendError::from_kube)? {
            None => {
                let cm = ConfigMap {
                    metadata: ObjectMeta {
                        name: Some(name.to_string()),
                        namespace: Some(namespace.to_string()),
                        labels: Some(labels.clone()),
                        ..Default::default()
                    },
                    data: Some(data.clone()),
                    ..Default::default()
                };
                api.create(&PostParams::default(), &cm).await.map_err(BackendError::from_kube)?;
                Ok(ApplyOutcome::Created)
            }
            Some(existing) if existing.data.as_ref() == Some(data) => Ok(ApplyOutcome::Unchanged),
            Some(_) => {
                let patch = serde_json::json!({
                    "metadata": { "labels": labels },
                    "data": data,
                });
                api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
                    .await
                    .map_err(BackendError::from_kube)?;
                Ok(ApplyOutcome::Updated)
            }
        }
    }

    async fn update_provisioning_request_status(&self, name: &str, status: &ProvisioningRequestStatus) -> Result<(), BackendError> {
        let api: Api<ProvisioningRequest> = Api::all(self.client.clone());
        let patch = serde_json::json!({ "status": status });
        api.patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(BackendError::from_kube)?;
        debug!("Patched ProvisioningRequest {} status", name);
        Ok(())
    }

    async fn get_cluster_instance(&self, namespace: &str, name: &str) -> Result<Option<ClusterInstance>, BackendError> {
        let api = self.dynamic_api(namespace, &cluster_instance_resource());
        let Some(obj) = api.get_opt(name).await.map_err(BackendError::from_kube)? else {
            return Ok(None);
        };
        Ok(Some(ClusterInstance {
            conditions: conditions_from(&obj.data)?,
            spec: obj.data.get("spec").cloned().unwrap_or(Value::Null),
            name: obj.metadata.name.unwrap_or_default(),
            namespace: obj.metadata.namespace.unwrap_or_default(),
        }))
    }

    async fn apply_cluster_instance(&self, descriptor: &Value, dry_run: bool) -> Result<ApplyOutcome, BackendError> {
        let name = descriptor
            .pointer("/metadata/name")
            .and_then(Value::as_str)
            .ok_or_else(|| BackendError::Invalid("ClusterInstance metadata.name is required".to_string()))?;
        let namespace = descriptor
            .pointer("/metadata/namespace")
            .and_then(Value::as_str)
            .ok_or_else(|| BackendError::Invalid("ClusterInstance metadata.namespace is required".to_string()))?;
        let api = self.dynamic_api(namespace, &cluster_instance_resource());
        let pp = PostParams {
            dry_run,
            field_manager: Some(FIELD_MANAGER.to_string()),
        };

        let Some(mut existing) = api.get_opt(name).await.map_err(BackendError::from_kube)? else {
            let obj: DynamicObject = serde_json::from_value(descriptor.clone())?;
            api.create(&pp, &obj).await.map_err(BackendError::from_kube)?;
            if !dry_run {
                info!("Created ClusterInstance {}/{}", namespace, name);
            }
            return Ok(ApplyOutcome::Created);
        };

        let spec = descriptor.get("spec").cloned().unwrap_or(Value::Null);
        let labels: BTreeMap<String, String> = match descriptor.pointer("/metadata/labels") {
            Some(raw) if !raw.is_null() => serde_json::from_value(raw.clone())?,
            _ => BTreeMap::new(),
        };
        let existing_labels = existing.metadata.labels.get_or_insert_with(BTreeMap::new);
        let labels_match = labels.iter().all(|(k, v)| existing_labels.get(k) == Some(v));
        if labels_match && existing.data.get("spec") == Some(&spec) {
            return Ok(ApplyOutcome::Unchanged);
        }
        existing_labels.extend(labels);
        existing.data["spec"] = spec;

        // replace carries the resourceVersion we read, so a concurrent edit surfaces as a conflict
        api.replace(name, &pp, &existing).await.map_err(BackendError::from_kube)?;
        if !dry_run {
            info!("Updated ClusterInstance {}/{}", namespace, name);
        }
        Ok(ApplyOutcome::Updated)
    }

    async fn get_node_allocation_request(&self, namespace: &str, name: &str) -> Result<Option<NodeAllocationRequest>, BackendError> {
        let api = self.dynamic_api(namespace, &node_allocation_request_resource());
        api.get_opt(name)
            .await
            .map_err(BackendError::from_kube)?
            .map(node_allocation_request_from)
            .transpose()
    }

    async fn apply_node_allocation_request(&self, request: &NodeAllocationRequest) -> Result<ApplyOutcome, BackendError> {
        let ar = node_allocation_request_resource();
        let api = self.dynamic_api(&request.namespace, &ar);

        match api.get_opt(&request.name).await.map_err(BackendError::from_kube)? {
            None => {
                let obj: DynamicObject = serde_json::from_value(serde_json::json!({
                    "apiVersion": ar.api_version,
                    "kind": ar.kind,
                    "metadata": {
                        "name": request.name,
                        "namespace": request.namespace,
                        "labels": request.labels,
                    },
                    "spec": request.spec,
                }))?;
                api.create(&PostParams::default(), &obj).await.map_err(BackendError::from_kube)?;
                info!("Created NodeAllocationRequest {}/{}", request.namespace, request.name);
                Ok(ApplyOutcome::Created)
            }
            Some(existing) => {
                let current = node_allocation_request_from(existing)?;
                if current.spec.node_group == request.spec.node_group {
                    return Ok(ApplyOutcome::Unchanged);
                }
                let patch = serde_json::json!({ "spec": request.spec });
                api.patch(&request.name, &PatchParams::default(), &Patch::Merge(&patch))
                    .await
                    .map_err(BackendError::from_kube)?;
                info!("Updated NodeAllocationRequest {}/{} node groups", request.namespace, request.name);
                Ok(ApplyOutcome::Updated)
            }
        }
    }

    async fn list_allocated_nodes(&self, namespace: &str, request_name: &str) -> Result<Vec<AllocatedNode>, BackendError> {
        let api = self.dynamic_api(namespace, &allocated_node_resource());
        let lp = ListParams::default().labels(&format!("{ALLOCATED_NODE_REQUEST_LABEL}={request_name}"));
        let list = api.list(&lp).await.map_err(BackendError::from_kube)?;
        list.items.iter().map(allocated_node_from).collect()
    }

    async fn list_policies(&self, cluster_namespace: &str) -> Result<Vec<PolicyRecord>, BackendError> {
        let api = self.dynamic_api(cluster_namespace, &policy_resource());
        let list = api.list(&ListParams::default()).await.map_err(BackendError::from_kube)?;
        Ok(list.items.iter().map(policy_from).collect())
    }

    async fn get_managed_cluster(&self, name: &str) -> Result<Option<ManagedClusterStatus>, BackendError> {
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &managed_cluster_resource());
        let Some(obj) = api.get_opt(name).await.map_err(BackendError::from_kube)? else {
            return Ok(None);
        };
        Ok(Some(ManagedClusterStatus {
            conditions: conditions_from(&obj.data)?,
        }))
    }
}

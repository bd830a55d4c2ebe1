//! Provisioning Backends
//!
//! Narrow contracts for the collaborators the provisioning orchestrator talks to:
//!
//! - **Resource store**: ClusterTemplates, ConfigMaps, namespaces, secrets and
//!   ProvisioningRequest status writes
//! - **Hardware backend**: NodeAllocationRequests and their AllocatedNodes
//! - **Cluster-install backend**: ClusterInstance apply (real and dry-run) and status
//! - **Compliance backend**: policies and ManagedCluster readiness
//!
//! [`KubeBackend`] implements the contract against a Kubernetes API server.
//! With the `test-util` feature, [`MockBackend`] keeps everything in memory.

pub mod client;
pub mod error;
pub mod models;
#[path = "trait.rs"]
pub mod backend_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use backend_trait::ProvisioningBackend;
pub use client::KubeBackend;
pub use error::BackendError;
pub use models::*;
#[cfg(any(test, feature = "test-util"))]
pub use mock::MockBackend;

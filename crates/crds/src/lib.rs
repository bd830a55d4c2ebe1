//! Provisioning CRD Definitions
//!
//! Kubernetes Custom Resource Definitions for the provisioning request
//! orchestrator, plus the status condition types shared with the
//! hardware and cluster-install collaborators.

pub mod cluster_template;
pub mod conditions;
pub mod provisioning_request;
pub mod references;
pub mod schema;

pub use cluster_template::*;
pub use conditions::*;
pub use provisioning_request::*;
pub use references::*;

/// API group of every CRD in this crate
pub const API_GROUP: &str = "o2ims.provisioning.oran.org";

/// Label stamped on every child resource to map it back to its ProvisioningRequest
pub const PROVISIONING_REQUEST_NAME_LABEL: &str = "provisioningrequest.o2ims.provisioning.oran.org/name";

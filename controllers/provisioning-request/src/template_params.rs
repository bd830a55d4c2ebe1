//! Template parameter kinds.
//!
//! A ProvisioningRequest carries one parameter block per rendered artefact.
//! Each kind pairs its parameter key with the ConfigMap that holds its
//! defaults and the timeout configured there.

use crate::timeouts::{
    CLUSTER_CONFIGURATION_TIMEOUT_KEY, CLUSTER_INSTALLATION_TIMEOUT_KEY, DEFAULT_CLUSTER_CONFIGURATION_TIMEOUT,
    DEFAULT_CLUSTER_INSTALLATION_TIMEOUT,
};
use crds::Templates;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateParameterKind {
    ClusterInstance,
    PolicyTemplate,
}

impl TemplateParameterKind {
    pub const ALL: [Self; 2] = [Self::ClusterInstance, Self::PolicyTemplate];

    /// Key of the parameter block in `templateParameters`
    pub fn parameter_key(self) -> &'static str {
        match self {
            Self::ClusterInstance => "clusterInstanceParameters",
            Self::PolicyTemplate => "policyTemplateParameters",
        }
    }

    /// Data key of the defaults document inside the defaults ConfigMap
    pub fn defaults_key(self) -> &'static str {
        match self {
            Self::ClusterInstance => "clusterinstance-defaults",
            Self::PolicyTemplate => "policytemplate-defaults",
        }
    }

    /// Name of the defaults ConfigMap declared by the template
    pub fn defaults_config_map(self, templates: &Templates) -> &str {
        match self {
            Self::ClusterInstance => &templates.cluster_instance_defaults,
            Self::PolicyTemplate => &templates.policy_template_defaults,
        }
    }

    pub fn timeout_key(self) -> &'static str {
        match self {
            Self::ClusterInstance => CLUSTER_INSTALLATION_TIMEOUT_KEY,
            Self::PolicyTemplate => CLUSTER_CONFIGURATION_TIMEOUT_KEY,
        }
    }

    pub fn default_timeout(self) -> Duration {
        match self {
            Self::ClusterInstance => DEFAULT_CLUSTER_INSTALLATION_TIMEOUT,
            Self::PolicyTemplate => DEFAULT_CLUSTER_CONFIGURATION_TIMEOUT,
        }
    }

    /// Policy parameters are optional; cluster parameters are not
    pub fn requires_data(self) -> bool {
        matches!(self, Self::ClusterInstance)
    }

    /// Whether the user block itself is checked against a schema closed to
    /// unknown fields, rather than the merged document.
    ///
    /// The cluster sub-schema lists only the fields exposed to users; the
    /// full descriptor is checked by the dry-run apply.
    pub fn validates_raw_input(self) -> bool {
        matches!(self, Self::ClusterInstance)
    }
}

impl fmt::Display for TemplateParameterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.parameter_key())
    }
}

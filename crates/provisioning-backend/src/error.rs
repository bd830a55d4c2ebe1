//! Backend error types

use thiserror::Error;

/// Errors returned by a provisioning backend
#[derive(Debug, Error)]
pub enum BackendError {
    /// Kubernetes API error not covered by a more specific variant
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Resource not found
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// The backend rejected the object as invalid (HTTP 400/422)
    #[error("{0}")]
    Invalid(String),

    /// Concurrent modification detected (HTTP 409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML document could not be parsed
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Backend unreachable or returned an unexpected response
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

impl BackendError {
    /// Returns true when the error means the submitted object is invalid
    /// and retrying without a user change cannot succeed.
    pub fn is_invalid(&self) -> bool {
        matches!(self, Self::Invalid(_))
    }

    /// Classifies a kube client error by HTTP status.
    pub fn from_kube(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(ref ae) if ae.code == 400 || ae.code == 422 => Self::Invalid(ae.message.clone()),
            kube::Error::Api(ref ae) if ae.code == 404 => Self::NotFound(ae.message.clone()),
            kube::Error::Api(ref ae) if ae.code == 409 => Self::Conflict(ae.message.clone()),
            other => Self::Kube(other),
        }
    }
}

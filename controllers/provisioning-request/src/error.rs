//! Controller-specific error types.
//!
//! [`ControllerError`] is what a reconciliation returns to the runtime.
//! [`StageError`] is the per-stage classification that decides whether a
//! failure is terminal (bad input) or worth retrying.

use crate::merge::ConfigurationError;
use kube::Error as KubeError;
use provisioning_backend::BackendError;
use thiserror::Error;

/// Errors that can occur in the ProvisioningRequest Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Collaborator backend error
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Object without the key needed to reconcile it
    #[error("Object is missing {0}")]
    MissingObjectKey(&'static str),

    /// A stage failed with a retryable error
    #[error("Reconciliation failed: {0}")]
    Reconciliation(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}

/// Outcome class of a failed pipeline stage
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StageError {
    /// The request or its template is wrong; retrying cannot help until it is edited
    #[error("{0}")]
    Input(String),

    /// A collaborator is unavailable or not ready yet
    #[error("{0}")]
    Transient(String),
}

impl StageError {
    pub fn input(message: impl Into<String>) -> Self {
        Self::Input(message.into())
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient(message.into())
    }

    pub fn is_input(&self) -> bool {
        matches!(self, Self::Input(_))
    }

    /// Prefixes the message, keeping the class
    pub fn context(self, context: impl std::fmt::Display) -> Self {
        match self {
            Self::Input(m) => Self::Input(format!("{context}: {m}")),
            Self::Transient(m) => Self::Transient(format!("{context}: {m}")),
        }
    }
}

impl From<BackendError> for StageError {
    fn from(err: BackendError) -> Self {
        if err.is_invalid() {
            Self::Input(err.to_string())
        } else {
            Self::Transient(err.to_string())
        }
    }
}

impl From<ConfigurationError> for StageError {
    fn from(err: ConfigurationError) -> Self {
        Self::Input(err.to_string())
    }
}

impl From<StageError> for ControllerError {
    fn from(err: StageError) -> Self {
        Self::Reconciliation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_errors_are_classified() {
        let invalid: StageError = BackendError::Invalid("spec.nodes: Required value".to_string()).into();
        assert!(invalid.is_input());
        assert_eq!(invalid.to_string(), "spec.nodes: Required value");

        let unavailable: StageError = BackendError::Unavailable("connection refused".to_string()).into();
        assert!(!unavailable.is_input());
    }

    #[test]
    fn test_context_keeps_class() {
        let err = StageError::input("bad value").context("failed to merge data");
        assert_eq!(err, StageError::Input("failed to merge data: bad value".to_string()));
    }
}

//! Controller-specific error types.
//!
//! This module defines error types specific to the NodeConfig Controller
//! that are not covered by upstream library errors.

use kube::Error as KubeError;
use metal_client::MetalError;
use thiserror::Error;

/// Errors that can occur in the NodeConfig Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Declarative-store error
    #[error("store error: {0}")]
    Store(#[from] MetalError),

    /// Record spec cannot be acted on; surfaced as a failure message
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Store failure while wiring record, document, and host together
    #[error("Association failed: {0}")]
    Association(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}

impl ControllerError {
    /// True when the condition is transient and the pass should be retried
    /// by the scheduler. Validation failures are terminal until the record
    /// spec changes.
    pub fn is_retryable(&self) -> bool {
        match self {
            ControllerError::InvalidConfig(_) => false,
            ControllerError::Store(MetalError::InvalidResource(_)) => false,
            ControllerError::Kube(_)
            | ControllerError::Store(_)
            | ControllerError::Association(_)
            | ControllerError::Watch(_) => true,
        }
    }
}

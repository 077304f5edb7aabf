//! Store client errors

use thiserror::Error;

/// Errors that can occur when talking to the declarative object store.
///
/// API failures are classified into the variants the reconcilers branch
/// on; anything else stays a raw Kubernetes error.
#[derive(Debug, Error)]
pub enum MetalError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Resource not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Create of a resource that already exists
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Optimistic-concurrency conflict on write; re-read and redo
    #[error("version conflict: {0}")]
    Conflict(String),

    /// Resource is missing fields required for the requested operation
    #[error("invalid resource: {0}")]
    InvalidResource(String),
}

//! MetalClient trait for mocking
//!
//! This trait abstracts the declarative object store to enable mocking in
//! unit tests. The concrete [`crate::MetalClient`] implements it against
//! the Kubernetes API; tests use the in-memory mock implementation.

use crds::{BareMetalHost, NodeConfig, NodeConfigStatus};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;

use crate::error::MetalError;

/// Trait for declarative-store operations
///
/// Reads return `None` for absent resources: the reconcilers treat
/// absence as ordinary state, not failure. Deletes of absent resources
/// succeed for the same reason. All async methods must be `Send` to work
/// with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait MetalClientTrait: Send + Sync {
    // NodeConfig operations
    async fn get_node_config(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<NodeConfig>, MetalError>;
    async fn patch_node_config_status(
        &self,
        namespace: &str,
        name: &str,
        status: &NodeConfigStatus,
    ) -> Result<(), MetalError>;
    async fn delete_node_config(&self, namespace: &str, name: &str) -> Result<(), MetalError>;

    // BareMetalHost operations
    async fn get_host(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BareMetalHost>, MetalError>;
    async fn create_host(&self, host: &BareMetalHost) -> Result<BareMetalHost, MetalError>;
    /// Replace the host's spec and metadata against the resource version
    /// carried by `host`; a stale version yields [`MetalError::Conflict`].
    async fn replace_host(&self, host: &BareMetalHost) -> Result<BareMetalHost, MetalError>;
    async fn delete_host(&self, namespace: &str, name: &str) -> Result<(), MetalError>;

    // Secret operations
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, MetalError>;
    async fn create_secret(&self, secret: &Secret) -> Result<Secret, MetalError>;
    async fn set_secret_owner(
        &self,
        namespace: &str,
        name: &str,
        owner: OwnerReference,
    ) -> Result<(), MetalError>;
}

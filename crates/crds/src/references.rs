//! Shared object references
//!
//! Reference types used across the metalinit CRDs, following the
//! Kubernetes SecretReference pattern: a name plus an optional namespace
//! that defaults to the referencing resource's namespace.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Reference to a core/v1 Secret.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SecretReference {
    /// Name of the referenced secret
    pub name: String,

    /// Namespace of the referenced secret (defaults to the same namespace
    /// as the referencing resource)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl SecretReference {
    /// Create a reference to a secret in the given namespace.
    pub fn new(name: String, namespace: String) -> Self {
        Self {
            name,
            namespace: Some(namespace),
        }
    }
}

//! Mock store client for unit testing
//!
//! In-memory implementation of [`MetalClientTrait`] so reconciler tests
//! can run without a cluster. Resources live in per-kind maps keyed by
//! namespace/name; creates assign UIDs and resource versions the way the
//! API server would, and stale-version replaces fail with a conflict so
//! optimistic-concurrency paths are testable.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crds::{BareMetalHost, NodeConfig, NodeConfigStatus};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};

use crate::error::MetalError;
use crate::metal_trait::MetalClientTrait;

type Key = (String, String);

/// Mock store client for testing
#[derive(Clone, Default)]
pub struct MockMetalClient {
    node_configs: Arc<Mutex<HashMap<Key, NodeConfig>>>,
    hosts: Arc<Mutex<HashMap<Key, BareMetalHost>>>,
    secrets: Arc<Mutex<HashMap<Key, Secret>>>,
}

fn key_of(metadata: &ObjectMeta) -> Result<Key, MetalError> {
    let name = metadata
        .name
        .clone()
        .ok_or_else(|| MetalError::InvalidResource("resource missing name".into()))?;
    let namespace = metadata
        .namespace
        .clone()
        .ok_or_else(|| MetalError::InvalidResource("resource missing namespace".into()))?;
    Ok((namespace, name))
}

fn stamp(metadata: &mut ObjectMeta) {
    if metadata.uid.is_none() {
        metadata.uid = Some(uuid::Uuid::new_v4().to_string());
    }
    if metadata.resource_version.is_none() {
        metadata.resource_version = Some("1".to_string());
    }
}

fn bump(metadata: &mut ObjectMeta) {
    let next = metadata
        .resource_version
        .as_deref()
        .and_then(|version| version.parse::<u64>().ok())
        .unwrap_or(0)
        + 1;
    metadata.resource_version = Some(next.to_string());
}

impl MockMetalClient {
    /// Create an empty mock store
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a NodeConfig, stamping a UID and resource version like the
    /// API server would (for test setup)
    pub fn add_node_config(&self, mut config: NodeConfig) {
        stamp(&mut config.metadata);
        if let Ok(key) = key_of(&config.metadata) {
            self.node_configs.lock().unwrap().insert(key, config);
        }
    }

    /// Seed a BareMetalHost (for test setup)
    pub fn add_host(&self, mut host: BareMetalHost) {
        stamp(&mut host.metadata);
        if let Ok(key) = key_of(&host.metadata) {
            self.hosts.lock().unwrap().insert(key, host);
        }
    }

    /// Seed a Secret (for test setup)
    pub fn add_secret(&self, mut secret: Secret) {
        stamp(&mut secret.metadata);
        if let Ok(key) = key_of(&secret.metadata) {
            self.secrets.lock().unwrap().insert(key, secret);
        }
    }

    /// Overwrite a host's reported provisioning state and operational
    /// status, simulating the host-management subsystem
    pub fn set_host_state(&self, namespace: &str, name: &str, state: &str, operational: &str) {
        let mut hosts = self.hosts.lock().unwrap();
        if let Some(host) = hosts.get_mut(&(namespace.to_string(), name.to_string())) {
            let status = host.status.get_or_insert_with(Default::default);
            status.provisioning.state = state.to_string();
            status.operational_status = operational.to_string();
        }
    }

    /// Current NodeConfig, if stored
    pub fn node_config(&self, namespace: &str, name: &str) -> Option<NodeConfig> {
        self.node_configs
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Current BareMetalHost, if stored
    pub fn host(&self, namespace: &str, name: &str) -> Option<BareMetalHost> {
        self.hosts
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Current Secret, if stored
    pub fn secret(&self, namespace: &str, name: &str) -> Option<Secret> {
        self.secrets
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Number of stored secrets
    pub fn secret_count(&self) -> usize {
        self.secrets.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl MetalClientTrait for MockMetalClient {
    async fn get_node_config(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<NodeConfig>, MetalError> {
        Ok(self.node_config(namespace, name))
    }

    async fn patch_node_config_status(
        &self,
        namespace: &str,
        name: &str,
        status: &NodeConfigStatus,
    ) -> Result<(), MetalError> {
        let mut configs = self.node_configs.lock().unwrap();
        let config = configs
            .get_mut(&(namespace.to_string(), name.to_string()))
            .ok_or_else(|| MetalError::NotFound(format!("NodeConfig {namespace}/{name}")))?;
        config.status = Some(status.clone());
        bump(&mut config.metadata);
        Ok(())
    }

    async fn delete_node_config(&self, namespace: &str, name: &str) -> Result<(), MetalError> {
        self.node_configs
            .lock()
            .unwrap()
            .remove(&(namespace.to_string(), name.to_string()));
        Ok(())
    }

    async fn get_host(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BareMetalHost>, MetalError> {
        Ok(self.host(namespace, name))
    }

    async fn create_host(&self, host: &BareMetalHost) -> Result<BareMetalHost, MetalError> {
        let key = key_of(&host.metadata)?;
        let mut hosts = self.hosts.lock().unwrap();
        if hosts.contains_key(&key) {
            return Err(MetalError::AlreadyExists(format!(
                "BareMetalHost {}/{}",
                key.0, key.1
            )));
        }
        let mut stored = host.clone();
        stamp(&mut stored.metadata);
        hosts.insert(key, stored.clone());
        Ok(stored)
    }

    async fn replace_host(&self, host: &BareMetalHost) -> Result<BareMetalHost, MetalError> {
        let key = key_of(&host.metadata)?;
        let mut hosts = self.hosts.lock().unwrap();
        let existing = hosts
            .get_mut(&key)
            .ok_or_else(|| MetalError::NotFound(format!("BareMetalHost {}/{}", key.0, key.1)))?;
        if host.metadata.resource_version.is_some()
            && host.metadata.resource_version != existing.metadata.resource_version
        {
            return Err(MetalError::Conflict(format!(
                "BareMetalHost {}/{}: stale resource version",
                key.0, key.1
            )));
        }
        // status is a subresource; replace only touches spec and metadata
        let status = existing.status.clone();
        let mut stored = host.clone();
        stored.metadata.uid = existing.metadata.uid.clone();
        stored.metadata.resource_version = existing.metadata.resource_version.clone();
        stored.status = status;
        bump(&mut stored.metadata);
        *existing = stored.clone();
        Ok(stored)
    }

    async fn delete_host(&self, namespace: &str, name: &str) -> Result<(), MetalError> {
        self.hosts
            .lock()
            .unwrap()
            .remove(&(namespace.to_string(), name.to_string()));
        Ok(())
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, MetalError> {
        Ok(self.secret(namespace, name))
    }

    async fn create_secret(&self, secret: &Secret) -> Result<Secret, MetalError> {
        let key = key_of(&secret.metadata)?;
        let mut secrets = self.secrets.lock().unwrap();
        if secrets.contains_key(&key) {
            return Err(MetalError::AlreadyExists(format!(
                "Secret {}/{}",
                key.0, key.1
            )));
        }
        let mut stored = secret.clone();
        stamp(&mut stored.metadata);
        secrets.insert(key, stored.clone());
        Ok(stored)
    }

    async fn set_secret_owner(
        &self,
        namespace: &str,
        name: &str,
        owner: OwnerReference,
    ) -> Result<(), MetalError> {
        let mut secrets = self.secrets.lock().unwrap();
        let secret = secrets
            .get_mut(&(namespace.to_string(), name.to_string()))
            .ok_or_else(|| MetalError::NotFound(format!("Secret {namespace}/{name}")))?;
        secret.metadata.owner_references = Some(vec![owner]);
        bump(&mut secret.metadata);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crds::{BareMetalHostSpec, NodeConfigSpec};

    fn host(namespace: &str, name: &str) -> BareMetalHost {
        BareMetalHost {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            spec: BareMetalHostSpec::default(),
            status: None,
        }
    }

    #[tokio::test]
    async fn test_create_host_assigns_identity() {
        let store = MockMetalClient::new();
        let created = store.create_host(&host("default", "node-0")).await.unwrap();
        assert!(created.metadata.uid.is_some());
        assert_eq!(created.metadata.resource_version.as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_duplicate_create_is_already_exists() {
        let store = MockMetalClient::new();
        store.create_host(&host("default", "node-0")).await.unwrap();
        let err = store
            .create_host(&host("default", "node-0"))
            .await
            .unwrap_err();
        assert!(matches!(err, MetalError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_stale_replace_conflicts() {
        let store = MockMetalClient::new();
        let created = store.create_host(&host("default", "node-0")).await.unwrap();

        let mut fresh = created.clone();
        fresh.spec.online = true;
        store.replace_host(&fresh).await.unwrap();

        // replay the original (now stale) read
        let mut stale = created;
        stale.spec.online = false;
        let err = store.replace_host(&stale).await.unwrap_err();
        assert!(matches!(err, MetalError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_replace_preserves_status_subresource() {
        let store = MockMetalClient::new();
        let created = store.create_host(&host("default", "node-0")).await.unwrap();
        store.set_host_state("default", "node-0", "ready", "OK");

        let mut updated = store.host("default", "node-0").unwrap();
        updated.spec.online = true;
        updated.status = None;
        store.replace_host(&updated).await.unwrap();

        let stored = store.host("default", "node-0").unwrap();
        assert_eq!(stored.provisioning_state(), "ready");
        assert!(stored.spec.online);
        assert_eq!(stored.metadata.uid, created.metadata.uid);
    }

    #[tokio::test]
    async fn test_status_patch_requires_existing_record() {
        let store = MockMetalClient::new();
        let err = store
            .patch_node_config_status("default", "node-0", &NodeConfigStatus::default())
            .await
            .unwrap_err();
        assert!(matches!(err, MetalError::NotFound(_)));

        store.add_node_config(NodeConfig {
            metadata: ObjectMeta {
                name: Some("node-0".to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            spec: NodeConfigSpec {
                bmc: None,
                image: None,
                files: Vec::new(),
                cloud_init_commands: Vec::new(),
                users: Vec::new(),
                ntp: None,
                format: None,
            },
            status: None,
        });
        store
            .patch_node_config_status(
                "default",
                "node-0",
                &NodeConfigStatus {
                    ready: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let stored = store.node_config("default", "node-0").unwrap();
        assert!(stored.status.unwrap().ready);
    }
}

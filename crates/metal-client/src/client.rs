//! Kubernetes-backed store client

use crds::{BareMetalHost, NodeConfig, NodeConfigStatus};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::Api;
use kube::api::{DeleteParams, Patch, PatchParams, PostParams};
use tracing::debug;

use crate::error::MetalError;
use crate::metal_trait::MetalClientTrait;

/// Store client backed by the Kubernetes API.
///
/// Every mutation is expressed against the resource version last read:
/// status updates go out as merge patches, host association as a replace
/// carrying the read object's resourceVersion, so a concurrent writer
/// surfaces as [`MetalError::Conflict`] rather than a lost update.
#[derive(Clone)]
pub struct MetalClient {
    client: kube::Client,
}

impl MetalClient {
    /// Create a store client on top of a Kubernetes client.
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }

    fn node_configs(&self, namespace: &str) -> Api<NodeConfig> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn hosts(&self, namespace: &str) -> Api<BareMetalHost> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn secrets(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Classify an API failure into the variants reconcilers branch on.
fn classify(operation: &str, err: kube::Error) -> MetalError {
    match &err {
        kube::Error::Api(response) if response.code == 404 => {
            MetalError::NotFound(format!("{operation}: {}", response.message))
        }
        kube::Error::Api(response) if response.reason == "AlreadyExists" => {
            MetalError::AlreadyExists(format!("{operation}: {}", response.message))
        }
        kube::Error::Api(response) if response.code == 409 => {
            MetalError::Conflict(format!("{operation}: {}", response.message))
        }
        _ => MetalError::Kube(err),
    }
}

/// True when the failure is a plain 404.
fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(response) if response.code == 404)
}

#[async_trait::async_trait]
impl MetalClientTrait for MetalClient {
    async fn get_node_config(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<NodeConfig>, MetalError> {
        match self.node_configs(namespace).get(name).await {
            Ok(config) => Ok(Some(config)),
            Err(err) if is_not_found(&err) => Ok(None),
            Err(err) => Err(classify("get NodeConfig", err)),
        }
    }

    async fn patch_node_config_status(
        &self,
        namespace: &str,
        name: &str,
        status: &NodeConfigStatus,
    ) -> Result<(), MetalError> {
        let patch = serde_json::json!({ "status": status });
        self.node_configs(namespace)
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|err| classify("patch NodeConfig status", err))?;
        debug!("Patched NodeConfig {}/{} status", namespace, name);
        Ok(())
    }

    async fn delete_node_config(&self, namespace: &str, name: &str) -> Result<(), MetalError> {
        match self
            .node_configs(namespace)
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(err) if is_not_found(&err) => Ok(()),
            Err(err) => Err(classify("delete NodeConfig", err)),
        }
    }

    async fn get_host(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BareMetalHost>, MetalError> {
        match self.hosts(namespace).get(name).await {
            Ok(host) => Ok(Some(host)),
            Err(err) if is_not_found(&err) => Ok(None),
            Err(err) => Err(classify("get BareMetalHost", err)),
        }
    }

    async fn create_host(&self, host: &BareMetalHost) -> Result<BareMetalHost, MetalError> {
        let namespace = host
            .metadata
            .namespace
            .as_deref()
            .ok_or_else(|| MetalError::InvalidResource("BareMetalHost missing namespace".into()))?;
        self.hosts(namespace)
            .create(&PostParams::default(), host)
            .await
            .map_err(|err| classify("create BareMetalHost", err))
    }

    async fn replace_host(&self, host: &BareMetalHost) -> Result<BareMetalHost, MetalError> {
        let namespace = host
            .metadata
            .namespace
            .as_deref()
            .ok_or_else(|| MetalError::InvalidResource("BareMetalHost missing namespace".into()))?;
        let name = host
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| MetalError::InvalidResource("BareMetalHost missing name".into()))?;
        self.hosts(namespace)
            .replace(name, &PostParams::default(), host)
            .await
            .map_err(|err| classify("replace BareMetalHost", err))
    }

    async fn delete_host(&self, namespace: &str, name: &str) -> Result<(), MetalError> {
        match self
            .hosts(namespace)
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(err) if is_not_found(&err) => Ok(()),
            Err(err) => Err(classify("delete BareMetalHost", err)),
        }
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, MetalError> {
        match self.secrets(namespace).get(name).await {
            Ok(secret) => Ok(Some(secret)),
            Err(err) if is_not_found(&err) => Ok(None),
            Err(err) => Err(classify("get Secret", err)),
        }
    }

    async fn create_secret(&self, secret: &Secret) -> Result<Secret, MetalError> {
        let namespace = secret
            .metadata
            .namespace
            .as_deref()
            .ok_or_else(|| MetalError::InvalidResource("Secret missing namespace".into()))?;
        self.secrets(namespace)
            .create(&PostParams::default(), secret)
            .await
            .map_err(|err| classify("create Secret", err))
    }

    async fn set_secret_owner(
        &self,
        namespace: &str,
        name: &str,
        owner: OwnerReference,
    ) -> Result<(), MetalError> {
        let patch = serde_json::json!({ "metadata": { "ownerReferences": [owner] } });
        self.secrets(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|err| classify("patch Secret owner", err))?;
        Ok(())
    }
}

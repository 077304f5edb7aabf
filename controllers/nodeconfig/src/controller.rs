//! Main controller implementation.
//!
//! This module contains the `Controller` struct that wires the store
//! client, reconciler, and resource watcher together for the NodeConfig
//! Controller.

use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crate::watcher::Watcher;
use crds::{BareMetalHost, NodeConfig};
use kube::{Api, Client};
use metal_client::MetalClient;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Main controller for NodeConfig management.
pub struct Controller {
    node_config_watcher: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    /// Creates a new controller instance.
    pub async fn new(namespace: Option<String>) -> Result<Self, ControllerError> {
        info!("Initializing NodeConfig Controller");

        // Create Kubernetes client
        let kube_client = Client::try_default().await?;

        // Create API clients
        let ns = namespace.as_deref().unwrap_or("default");
        let node_config_api: Api<NodeConfig> = Api::namespaced(kube_client.clone(), ns);
        let host_api: Api<BareMetalHost> = Api::namespaced(kube_client.clone(), ns);

        // Create store client and reconciler
        let store = MetalClient::new(kube_client);
        let reconciler = Arc::new(Reconciler::new(Box::new(store)));

        // Start the watcher in a background task
        let watcher_instance = Watcher::new(reconciler, node_config_api, host_api);
        let node_config_watcher =
            tokio::spawn(async move { watcher_instance.watch_node_configs().await });

        Ok(Self {
            node_config_watcher,
        })
    }

    /// Runs the controller until shutdown.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("NodeConfig Controller running");

        (&mut self.node_config_watcher)
            .await
            .map_err(|err| {
                ControllerError::Watch(format!("NodeConfig watcher panicked: {err}"))
            })?
            .map_err(|err| ControllerError::Watch(format!("NodeConfig watcher error: {err}")))?;

        Ok(())
    }
}

//! Kubernetes resource watchers.
//!
//! Runs a kube_runtime Controller on NodeConfig resources and maps
//! BareMetalHost events back to the same-named record, so host state
//! transitions (registering, ready, error) drive the next reconciliation
//! pass without polling.

use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crds::{BareMetalHost, NodeConfig};
use futures::StreamExt;
use kube::{Api, ResourceExt};
use kube_runtime::reflector::ObjectRef;
use kube_runtime::{Controller, controller::Action, watcher};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Watches Kubernetes resources for changes.
pub struct Watcher {
    reconciler: Arc<Reconciler>,
    node_config_api: Api<NodeConfig>,
    host_api: Api<BareMetalHost>,
}

impl Watcher {
    /// Creates a new watcher instance.
    pub fn new(
        reconciler: Arc<Reconciler>,
        node_config_api: Api<NodeConfig>,
        host_api: Api<BareMetalHost>,
    ) -> Self {
        Self {
            reconciler,
            node_config_api,
            host_api,
        }
    }

    /// Runs the NodeConfig controller until its watch streams end.
    ///
    /// Retryable errors requeue with the per-record Fibonacci backoff;
    /// terminal errors wait for the record's spec to change.
    pub async fn watch_node_configs(self) -> Result<(), ControllerError> {
        info!("Starting NodeConfig watcher");

        let reconcile = |config: Arc<NodeConfig>, ctx: Arc<Reconciler>| async move {
            let namespace = config.namespace().unwrap_or_else(|| "default".to_string());
            let name = config.name_any();
            debug!("Reconciling NodeConfig {}/{}", namespace, name);
            ctx.reconcile_node_config(&namespace, &name).await?;
            Ok(Action::await_change())
        };

        let error_policy = |config: Arc<NodeConfig>, err: &ControllerError, ctx: Arc<Reconciler>| {
            let resource_key = format!(
                "{}/{}",
                config.namespace().unwrap_or_else(|| "default".to_string()),
                config.name_any()
            );
            if err.is_retryable() {
                let (backoff, error_count) = ctx.get_backoff_for_resource(&resource_key);
                error!(
                    "Reconciliation error for NodeConfig {} ({} consecutive): {}; requeueing in {}s",
                    resource_key,
                    error_count,
                    err,
                    backoff.as_secs()
                );
                Action::requeue(backoff)
            } else {
                // Surfaced on the record's status; nothing to retry until
                // the spec changes.
                error!(
                    "Terminal reconciliation error for NodeConfig {}: {}",
                    resource_key, err
                );
                Action::await_change()
            }
        };

        Controller::new(self.node_config_api, watcher::Config::default())
            .watches(
                self.host_api,
                watcher::Config::default(),
                |host: BareMetalHost| {
                    // Identity-derived binding: a host event re-reconciles
                    // the record with the same namespace/name.
                    let name = host.name_any();
                    host.namespace()
                        .map(move |namespace| ObjectRef::new(&name).within(&namespace))
                },
            )
            .run(reconcile, error_policy, self.reconciler)
            .for_each(|result| async move {
                match result {
                    Ok((reconciled, _)) => debug!("Reconciled NodeConfig {:?}", reconciled),
                    Err(err) => error!("Controller error: {}", err),
                }
            })
            .await;

        Ok(())
    }
}

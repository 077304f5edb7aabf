//! Reconciliation engine for NodeConfig records.
//!
//! Each pass derives an explicit provisioning phase from the observed
//! record and host state, advances one side effect at a time, and
//! persists the status draft exactly once on exit. Nothing is carried in
//! memory between passes, so a crashed or repeated invocation always
//! resumes at the correct step.

use crate::backoff::FibonacciBackoff;
use crate::config_manager::{ConfigManager, HostFitness, StatusDraft};
use crate::error::ControllerError;
use crds::{BareMetalHost, NodeConfig, NodeConfigStatus};
use metal_client::{MetalClientTrait, MetalError};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Backoff state for a resource
#[derive(Debug, Clone)]
struct BackoffState {
    backoff: FibonacciBackoff,
    error_count: u32,
}

impl BackoffState {
    fn new() -> Self {
        Self {
            backoff: FibonacciBackoff::new(1, 10), // 1 minute min, 10 minutes max
            error_count: 0,
        }
    }
}

/// Provisioning phase of a record, derived from observed state.
///
/// Never persisted: re-derived from (status, host-or-absent) whenever a
/// decision is needed, so every pass agrees on what comes next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProvisioningPhase {
    /// No bootstrap document stored yet
    Pending,

    /// Document reference set, host descriptor not yet confirmed present
    DocumentBound,

    /// Host descriptor in hand, association incomplete
    HostBinding,

    /// Terminal: the record is fully provisioned
    Ready,
}

impl ProvisioningPhase {
    pub(crate) fn derive(status: &NodeConfigStatus, host: Option<&BareMetalHost>) -> Self {
        if status.ready {
            ProvisioningPhase::Ready
        } else if host.is_some() {
            ProvisioningPhase::HostBinding
        } else if status.user_data.is_some() {
            ProvisioningPhase::DocumentBound
        } else {
            ProvisioningPhase::Pending
        }
    }
}

/// What a completed pass did with the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PassOutcome {
    /// Converged for now; the next watch event drives further progress
    Settled,

    /// Record and host were deleted as resolution of a dead-end host
    Removed,
}

/// Reconciles NodeConfig records.
pub struct Reconciler {
    pub(crate) store: Box<dyn MetalClientTrait>,
    /// Error count tracking per resource (namespace/name -> BackoffState)
    backoff_states: Mutex<HashMap<String, BackoffState>>,
}

impl Reconciler {
    /// Creates a reconciler on top of a store client.
    pub fn new(store: Box<dyn MetalClientTrait>) -> Self {
        Self {
            store,
            backoff_states: Mutex::new(HashMap::new()),
        }
    }

    /// Reconciles one record identity.
    ///
    /// Absent records and already-ready records are no-ops. Errors are
    /// retryable unless [`ControllerError::is_retryable`] says otherwise;
    /// the per-resource error count feeds the watcher's requeue backoff.
    pub async fn reconcile_node_config(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<(), ControllerError> {
        let resource_key = format!("{namespace}/{name}");
        match self.reconcile_inner(namespace, name).await {
            Ok(()) => {
                self.reset_error(&resource_key);
                Ok(())
            }
            Err(err) => {
                if err.is_retryable() {
                    self.increment_error(&resource_key);
                }
                Err(err)
            }
        }
    }

    async fn reconcile_inner(&self, namespace: &str, name: &str) -> Result<(), ControllerError> {
        let Some(config) = self.store.get_node_config(namespace, name).await? else {
            debug!(
                "NodeConfig {}/{} is gone, nothing to reconcile",
                namespace, name
            );
            return Ok(());
        };
        if config.status.as_ref().is_some_and(|status| status.ready) {
            debug!(
                "NodeConfig {}/{} already provisioned, skipping",
                namespace, name
            );
            return Ok(());
        }
        info!("Reconciling NodeConfig {}/{}", namespace, name);

        let mut draft = StatusDraft::new(config.status.clone().unwrap_or_default());
        let outcome = self.run_pass(&config, &mut draft).await;

        // Terminal conditions are the only errors surfaced on the record
        // itself; transient ones stay in the logs and retry.
        if let Err(err) = &outcome {
            if !err.is_retryable() {
                draft.set_error(err.to_string());
            }
        }

        // One guaranteed status persist on every exit path, skipped when
        // the record was removed during the pass or nothing changed.
        if !matches!(&outcome, Ok(PassOutcome::Removed)) && draft.dirty() {
            match self
                .store
                .patch_node_config_status(namespace, name, draft.status())
                .await
            {
                Ok(()) => debug!("Persisted NodeConfig {}/{} status", namespace, name),
                Err(MetalError::NotFound(_)) => {
                    debug!(
                        "NodeConfig {}/{} deleted while reconciling, dropping status",
                        namespace, name
                    );
                }
                Err(persist_err) => {
                    error!(
                        "Failed to persist NodeConfig {}/{} status: {}",
                        namespace, name, persist_err
                    );
                    return match outcome {
                        Err(pass_err) => Err(pass_err),
                        Ok(_) => Err(persist_err.into()),
                    };
                }
            }
        }
        outcome.map(|_| ())
    }

    /// Advances the record's provisioning phase as far as observed state
    /// allows, one transition per loop iteration.
    async fn run_pass(
        &self,
        config: &NodeConfig,
        draft: &mut StatusDraft,
    ) -> Result<PassOutcome, ControllerError> {
        let manager = ConfigManager::new(self.store.as_ref(), config)?;
        // A fresh pass clears any stale terminal diagnosis.
        draft.clear_error();

        let mut found: Option<(BareMetalHost, HostFitness)> = None;
        loop {
            let host = found.as_ref().map(|(host, _)| host);
            match ProvisioningPhase::derive(draft.status(), host) {
                ProvisioningPhase::Ready => return Ok(PassOutcome::Settled),
                ProvisioningPhase::Pending => {
                    let reference = manager.ensure_bootstrap_document(draft.status()).await?;
                    draft.set_user_data(reference);
                }
                ProvisioningPhase::DocumentBound => match manager.find_host().await? {
                    Some(classified) => found = Some(classified),
                    None => {
                        manager.create_host().await?;
                        info!(
                            "BareMetalHost {}/{} created; waiting for it to register",
                            manager.namespace(),
                            manager.name()
                        );
                        return Ok(PassOutcome::Settled);
                    }
                },
                ProvisioningPhase::HostBinding => {
                    let Some((host, fitness)) = found.as_ref() else {
                        // derive only yields HostBinding with a host in hand
                        return Ok(PassOutcome::Settled);
                    };
                    match fitness {
                        HostFitness::Operable => {
                            let user_data =
                                draft.status().user_data.clone().ok_or_else(|| {
                                    ControllerError::InvalidConfig(format!(
                                        "NodeConfig {}/{} lost its bootstrap document reference",
                                        manager.namespace(),
                                        manager.name()
                                    ))
                                })?;
                            manager.associate(host, &user_data).await?;
                            draft.set_ready();
                            info!(
                                "NodeConfig {}/{} is ready",
                                manager.namespace(),
                                manager.name()
                            );
                        }
                        HostFitness::Unreported => {
                            debug!(
                                "BareMetalHost {}/{} has not reported state yet; waiting",
                                manager.namespace(),
                                manager.name()
                            );
                            return Ok(PassOutcome::Settled);
                        }
                        HostFitness::NotProvisionable => {
                            return self.resolve_dead_end(&manager, host, draft).await;
                        }
                    }
                }
            }
        }
    }

    /// A found host in a state this controller cannot provision from is a
    /// dead end: retrying would never converge. The record and host are
    /// deleted instead, with the diagnosis persisted first so an
    /// interrupted teardown still leaves a visible trace.
    async fn resolve_dead_end(
        &self,
        manager: &ConfigManager<'_>,
        host: &BareMetalHost,
        draft: &mut StatusDraft,
    ) -> Result<PassOutcome, ControllerError> {
        let message = format!(
            "BareMetalHost {}/{} is not provisionable (state '{}', operational status '{}'); removing the record and its host",
            manager.namespace(),
            manager.name(),
            host.provisioning_state(),
            host.operational_status()
        );
        warn!("{}", message);
        draft.set_error(message);

        match self
            .store
            .patch_node_config_status(manager.namespace(), manager.name(), draft.status())
            .await
        {
            Ok(()) | Err(MetalError::NotFound(_)) => {}
            Err(err) => return Err(err.into()),
        }
        manager.remove_record_and_host().await?;
        Ok(PassOutcome::Removed)
    }

    /// Get the Fibonacci backoff duration for a resource based on its
    /// error count. Returns (backoff, error_count).
    pub fn get_backoff_for_resource(&self, resource_key: &str) -> (Duration, u32) {
        match self.backoff_states.lock() {
            Ok(mut states) => {
                let state = states
                    .entry(resource_key.to_string())
                    .or_insert_with(BackoffState::new);
                (state.backoff.next_backoff(), state.error_count)
            }
            Err(err) => {
                warn!(
                    "Failed to lock backoff states: {}, using default backoff",
                    err
                );
                (Duration::from_secs(60), 0)
            }
        }
    }

    /// Increment error count for a resource
    fn increment_error(&self, resource_key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            let state = states
                .entry(resource_key.to_string())
                .or_insert_with(BackoffState::new);
            state.error_count += 1;
        }
    }

    /// Reset error count for a resource (on successful reconciliation)
    fn reset_error(&self, resource_key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            if let Some(state) = states.get_mut(resource_key) {
                state.error_count = 0;
                state.backoff.reset();
            }
        }
    }
}

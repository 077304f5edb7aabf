//! Association manager for NodeConfig records.
//!
//! Composes the store operations that wire one record to its bootstrap
//! document and backing BareMetalHost: materializing the rendered document
//! as a secret, creating the host descriptor and its BMC credentials, and
//! binding the two once the host is fit to provision. All host lookup is
//! identity-derived: the host descriptor shares the record's
//! namespace/name.

use cloudinit::{NodeInput, build_node_document};
use crds::{
    BMC, BMCDetails, BareMetalHost, BareMetalHostSpec, Image, NodeConfig, NodeConfigStatus,
    SecretReference,
};
use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::Resource;
use metal_client::{MetalClientTrait, MetalError};
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::error::ControllerError;

/// Provisioning states a host can be associated from.
const OPERABLE_STATES: [&str; 5] = [
    "ready",
    "inspecting",
    "registering",
    "match profile",
    "available",
];

/// Operational status reported by a healthy host.
const OPERATIONAL_STATUS_OK: &str = "OK";

/// Provisioning state that allows powering the host on.
const PROVISIONING_STATE_READY: &str = "ready";

/// Name suffix of the BMC credential secret.
const BMC_SECRET_SUFFIX: &str = "-bmc-secret";

/// Key under which the rendered document is stored in its secret.
const USER_DATA_KEY: &str = "value";

/// Fitness of a found host for association.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HostFitness {
    /// In an operable provisioning state with a healthy operational status
    Operable,

    /// Has not reported any state yet; classification is deferred until
    /// the host-management subsystem speaks up
    Unreported,

    /// In a state this controller cannot provision from
    NotProvisionable,
}

/// Classify a host's fitness from its reported state.
pub(crate) fn classify_host(host: &BareMetalHost) -> HostFitness {
    let state = host.provisioning_state();
    let operational = host.operational_status();
    if state.is_empty() && operational.is_empty() {
        return HostFitness::Unreported;
    }
    if OPERABLE_STATES.contains(&state) && operational == OPERATIONAL_STATUS_OK {
        HostFitness::Operable
    } else {
        HostFitness::NotProvisionable
    }
}

/// In-memory draft of a record's status.
///
/// The engine mutates the draft through a pass and persists it exactly
/// once on exit; `dirty` tells it whether there is anything to persist.
#[derive(Debug)]
pub(crate) struct StatusDraft {
    observed: NodeConfigStatus,
    draft: NodeConfigStatus,
}

impl StatusDraft {
    pub(crate) fn new(observed: NodeConfigStatus) -> Self {
        Self {
            draft: observed.clone(),
            observed,
        }
    }

    pub(crate) fn status(&self) -> &NodeConfigStatus {
        &self.draft
    }

    pub(crate) fn set_user_data(&mut self, reference: SecretReference) {
        self.draft.user_data = Some(reference);
    }

    /// Marks the record provisioned. Ready never reverts, so there is no
    /// inverse operation.
    pub(crate) fn set_ready(&mut self) {
        self.draft.ready = true;
    }

    /// Records a terminal diagnosis. Idempotent, no remote call.
    pub(crate) fn set_error(&mut self, message: impl Into<String>) {
        self.draft.failure_message = Some(message.into());
    }

    /// Clears a stale diagnosis. Idempotent, no remote call.
    pub(crate) fn clear_error(&mut self) {
        self.draft.failure_message = None;
    }

    pub(crate) fn dirty(&self) -> bool {
        self.draft != self.observed
    }
}

/// Manages the association between one record and its host.
pub(crate) struct ConfigManager<'a> {
    store: &'a dyn MetalClientTrait,
    config: &'a NodeConfig,
    name: String,
    namespace: String,
}

impl<'a> ConfigManager<'a> {
    pub(crate) fn new(
        store: &'a dyn MetalClientTrait,
        config: &'a NodeConfig,
    ) -> Result<Self, ControllerError> {
        let name = config
            .metadata
            .name
            .clone()
            .ok_or_else(|| ControllerError::InvalidConfig("NodeConfig missing name".to_string()))?;
        let namespace = config
            .metadata
            .namespace
            .clone()
            .unwrap_or_else(|| "default".to_string());
        Ok(Self {
            store,
            config,
            name,
            namespace,
        })
    }

    /// Renders the bootstrap document and stores it as a secret named
    /// after the record. A reference already on the status is returned
    /// as-is; an already-existing secret is re-resolved, not an error.
    pub(crate) async fn ensure_bootstrap_document(
        &self,
        status: &NodeConfigStatus,
    ) -> Result<SecretReference, ControllerError> {
        if let Some(existing) = &status.user_data {
            debug!(
                "NodeConfig {}/{} already references bootstrap document {}",
                self.namespace, self.name, existing.name
            );
            return Ok(existing.clone());
        }

        info!(
            "Creating bootstrap data for NodeConfig {}/{}",
            self.namespace, self.name
        );
        let document = build_node_document(&NodeInput {
            header: None,
            additional_files: self.config.spec.files.clone(),
            cloud_init_commands: self.config.spec.cloud_init_commands.clone(),
            users: self.config.spec.users.clone(),
            ntp: self.config.spec.ntp.clone(),
        });

        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                namespace: Some(self.namespace.clone()),
                owner_references: Some(vec![self.record_owner_ref()?]),
                ..Default::default()
            },
            data: Some(BTreeMap::from([(
                USER_DATA_KEY.to_string(),
                ByteString(document.into_bytes()),
            )])),
            ..Default::default()
        };

        match self.store.create_secret(&secret).await {
            Ok(created) => {
                info!(
                    "Stored bootstrap document for NodeConfig {}/{}",
                    self.namespace, self.name
                );
                Ok(SecretReference::new(
                    created.metadata.name.unwrap_or_else(|| self.name.clone()),
                    self.namespace.clone(),
                ))
            }
            Err(MetalError::AlreadyExists(_)) => {
                debug!(
                    "Bootstrap document secret {}/{} already exists, reusing it",
                    self.namespace, self.name
                );
                Ok(SecretReference::new(
                    self.name.clone(),
                    self.namespace.clone(),
                ))
            }
            Err(err) => Err(ControllerError::Association(format!(
                "failed to store bootstrap document for NodeConfig {}/{}: {}",
                self.namespace, self.name, err
            ))),
        }
    }

    /// Looks up the host descriptor sharing the record's identity and
    /// classifies its fitness for association.
    pub(crate) async fn find_host(
        &self,
    ) -> Result<Option<(BareMetalHost, HostFitness)>, ControllerError> {
        let Some(host) = self.store.get_host(&self.namespace, &self.name).await? else {
            debug!(
                "No BareMetalHost {}/{} found for NodeConfig",
                self.namespace, self.name
            );
            return Ok(None);
        };
        let fitness = classify_host(&host);
        debug!(
            "Found BareMetalHost {}/{} (state '{}', operational status '{}'): {:?}",
            self.namespace,
            self.name,
            host.provisioning_state(),
            host.operational_status(),
            fitness
        );
        Ok(Some((host, fitness)))
    }

    /// Creates the host descriptor and its BMC credential secret.
    ///
    /// Spec completeness is checked before any remote call. The credential
    /// secret is created first so the registering host can authenticate;
    /// it gains its owner reference afterwards, once the host's UID
    /// exists.
    pub(crate) async fn create_host(&self) -> Result<BareMetalHost, ControllerError> {
        // image details are validated here too, but only bound during
        // association
        let (bmc, _) = self.host_details()?;
        info!(
            "Creating BareMetalHost for NodeConfig {}/{}",
            self.namespace, self.name
        );

        let credentials_name = format!("{}{}", self.name, BMC_SECRET_SUFFIX);
        let credential_secret = Secret {
            metadata: ObjectMeta {
                name: Some(credentials_name.clone()),
                namespace: Some(self.namespace.clone()),
                ..Default::default()
            },
            type_: Some("Opaque".to_string()),
            data: Some(BTreeMap::from([
                (
                    "username".to_string(),
                    ByteString(bmc.username.clone().into_bytes()),
                ),
                (
                    "password".to_string(),
                    ByteString(bmc.password.clone().into_bytes()),
                ),
            ])),
            ..Default::default()
        };
        match self.store.create_secret(&credential_secret).await {
            Ok(_) => {}
            Err(MetalError::AlreadyExists(_)) => {
                debug!(
                    "BMC credential secret {}/{} already exists, reusing it",
                    self.namespace, credentials_name
                );
            }
            Err(err) => {
                return Err(ControllerError::Association(format!(
                    "failed to store BMC credentials for NodeConfig {}/{}: {}",
                    self.namespace, self.name, err
                )));
            }
        }

        let host = BareMetalHost {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                namespace: Some(self.namespace.clone()),
                ..Default::default()
            },
            spec: BareMetalHostSpec {
                bmc: BMCDetails {
                    address: bmc.address.clone(),
                    credentials_name: credentials_name.clone(),
                    disable_certificate_verification: true,
                },
                boot_mode: Some(self.config.boot_mode()),
                boot_mac_address: bmc.boot_mac_address.clone(),
                online: false,
                image: None,
                user_data: None,
            },
            status: None,
        };
        let created = self.store.create_host(&host).await.map_err(|err| {
            ControllerError::Association(format!(
                "failed to create BareMetalHost for NodeConfig {}/{}: {}",
                self.namespace, self.name, err
            ))
        })?;

        // The credential secret can only point at the host once its UID
        // exists.
        let owner = created.controller_owner_ref(&()).ok_or_else(|| {
            ControllerError::Association(format!(
                "created BareMetalHost {}/{} has no UID",
                self.namespace, self.name
            ))
        })?;
        self.store
            .set_secret_owner(&self.namespace, &credentials_name, owner)
            .await
            .map_err(|err| {
                ControllerError::Association(format!(
                    "failed to set BMC credential owner for BareMetalHost {}/{}: {}",
                    self.namespace, self.name, err
                ))
            })?;

        info!(
            "Created BareMetalHost {}/{} (online=false)",
            self.namespace, self.name
        );
        Ok(created)
    }

    /// Binds image and bootstrap document onto the host, powers it on when
    /// the host-management side reports it ready, and records the record
    /// as the host's controlling owner.
    pub(crate) async fn associate(
        &self,
        host: &BareMetalHost,
        user_data: &SecretReference,
    ) -> Result<BareMetalHost, ControllerError> {
        let (_, image) = self.host_details()?;
        info!(
            "Associating NodeConfig {}/{} with BareMetalHost",
            self.namespace, self.name
        );

        let mut updated = host.clone();
        updated.spec.image = Some(Image {
            url: image.url.clone(),
            checksum: image.checksum.clone(),
            checksum_type: Some(self.config.checksum_type()),
        });
        updated.spec.user_data = Some(user_data.clone());
        if host.provisioning_state() == PROVISIONING_STATE_READY {
            updated.spec.online = true;
        }

        let owner = self.record_owner_ref()?;
        let owners = updated.metadata.owner_references.get_or_insert_with(Vec::new);
        if !owners.iter().any(|reference| reference.uid == owner.uid) {
            owners.push(owner);
        }

        let replaced = self.store.replace_host(&updated).await.map_err(|err| {
            ControllerError::Association(format!(
                "failed to associate NodeConfig {}/{} with its BareMetalHost: {}",
                self.namespace, self.name, err
            ))
        })?;
        info!(
            "Associated BareMetalHost {}/{} (online={})",
            self.namespace, self.name, replaced.spec.online
        );
        Ok(replaced)
    }

    /// Deletes the host descriptor and the record itself; the resolution
    /// for a host this controller cannot provision from.
    pub(crate) async fn remove_record_and_host(&self) -> Result<(), ControllerError> {
        self.store
            .delete_host(&self.namespace, &self.name)
            .await
            .map_err(|err| {
                ControllerError::Association(format!(
                    "failed to delete BareMetalHost {}/{}: {}",
                    self.namespace, self.name, err
                ))
            })?;
        self.store
            .delete_node_config(&self.namespace, &self.name)
            .await
            .map_err(|err| {
                ControllerError::Association(format!(
                    "failed to delete NodeConfig {}/{}: {}",
                    self.namespace, self.name, err
                ))
            })?;
        info!(
            "Deleted NodeConfig {}/{} and its BareMetalHost",
            self.namespace, self.name
        );
        Ok(())
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn namespace(&self) -> &str {
        &self.namespace
    }

    /// BMC and image details, validated before any remote call.
    fn host_details(&self) -> Result<(&BMC, &Image), ControllerError> {
        let bmc = self.config.spec.bmc.as_ref().ok_or_else(|| {
            ControllerError::InvalidConfig(format!(
                "NodeConfig {}/{} has no BMC configuration",
                self.namespace, self.name
            ))
        })?;
        let image = self.config.spec.image.as_ref().ok_or_else(|| {
            ControllerError::InvalidConfig(format!(
                "NodeConfig {}/{} has no image configuration",
                self.namespace, self.name
            ))
        })?;
        if !self.config.has_host_details() {
            return Err(ControllerError::InvalidConfig(format!(
                "NodeConfig {}/{} BMC or image details are incomplete",
                self.namespace, self.name
            )));
        }
        Ok((bmc, image))
    }

    /// Controlling owner reference pointing back at the record.
    fn record_owner_ref(&self) -> Result<OwnerReference, ControllerError> {
        self.config.controller_owner_ref(&()).ok_or_else(|| {
            ControllerError::InvalidConfig(format!(
                "NodeConfig {}/{} has no UID; cannot own dependent resources",
                self.namespace, self.name
            ))
        })
    }
}

//! BareMetalHost CRD
//!
//! The metal3.io host descriptor backing a NodeConfig. The host-management
//! subsystem owns this resource's status; the nodeconfig controller only
//! creates the descriptor and binds image and user data onto its spec.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::node_config::{BootMode, Image};
use crate::references::SecretReference;

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "metal3.io",
    version = "v1alpha1",
    kind = "BareMetalHost",
    namespaced,
    status = "BareMetalHostStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct BareMetalHostSpec {
    /// How to reach the host's management controller
    #[serde(default)]
    pub bmc: BMCDetails,

    /// Firmware boot method for the host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boot_mode: Option<BootMode>,

    /// Which MAC address will PXE boot
    #[serde(
        default,
        rename = "bootMACAddress",
        skip_serializing_if = "Option::is_none"
    )]
    pub boot_mac_address: Option<String>,

    /// Whether the host should be powered on
    #[serde(default)]
    pub online: bool,

    /// Image to provision onto the host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<Image>,

    /// Reference to the secret holding cloud-init user data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_data: Option<SecretReference>,
}

/// Connection details for the host's management controller.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BMCDetails {
    /// URL for accessing the controller on the network
    #[serde(default)]
    pub address: String,

    /// Name of the secret holding the BMC username and password
    #[serde(default)]
    pub credentials_name: String,

    /// Skip certificate verification when talking to the BMC
    #[serde(default)]
    pub disable_certificate_verification: bool,
}

/// Host state reported by the host-management subsystem. Read-only here.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BareMetalHostStatus {
    /// Overall health of the host, "OK" when manageable
    #[serde(default)]
    pub operational_status: String,

    /// Where the host is in its provisioning lifecycle
    #[serde(default)]
    pub provisioning: ProvisioningStatus,

    /// Whether the host is currently powered on
    #[serde(default)]
    pub powered_on: bool,
}

/// Provisioning lifecycle of a host.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProvisioningStatus {
    /// Lifecycle state, e.g. "registering", "ready", "error". An open set
    /// owned by the host-management subsystem.
    #[serde(default)]
    pub state: String,
}

impl BareMetalHost {
    /// Provisioning state reported by the host, empty until first report.
    pub fn provisioning_state(&self) -> &str {
        self.status
            .as_ref()
            .map_or("", |status| status.provisioning.state.as_str())
    }

    /// Operational status reported by the host, empty until first report.
    pub fn operational_status(&self) -> &str {
        self.status
            .as_ref()
            .map_or("", |status| status.operational_status.as_str())
    }
}

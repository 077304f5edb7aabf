//! NodeConfig CRD
//!
//! The user-facing intent for bootstrapping one bare-metal node: how to
//! reach its BMC, which image to provision, and the cloud-init
//! customization (files, users, NTP, extra commands) baked into the
//! bootstrap document.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::references::SecretReference;

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "metal.microscaler.io",
    version = "v1alpha1",
    kind = "NodeConfig",
    namespaced,
    status = "NodeConfigStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct NodeConfigSpec {
    /// BMC access for the machine backing this record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bmc: Option<BMC>,

    /// Image to provision onto the machine
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<Image>,

    /// Extra files written at first boot
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<File>,

    /// Extra commands run after first boot, in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cloud_init_commands: Vec<String>,

    /// Extra users to create at first boot
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<User>,

    /// NTP configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ntp: Option<NTP>,

    /// Output format of the bootstrap document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<Format>,
}

/// Observed state of a NodeConfig; written only by the controller.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeConfigStatus {
    /// True once the host has been created, bound, and associated.
    /// Never reverts to false.
    #[serde(default)]
    pub ready: bool,

    /// Reference to the secret holding the rendered bootstrap document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_data: Option<SecretReference>,

    /// Set on terminal problems reconciling the record; cleared on the
    /// next successful pass. Transient errors are never surfaced here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,
}

/// BMC access details for a bare-metal machine.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BMC {
    /// URL for accessing the controller on the network
    pub address: String,

    /// ID for authenticating with the BMC
    pub username: String,

    /// Password for authenticating with the BMC
    pub password: String,

    /// MAC address of the NIC that will PXE boot. Optional for some BMC
    /// types, required for libvirt VMs driven by vbmc.
    #[serde(
        default,
        rename = "bootMACAddress",
        skip_serializing_if = "Option::is_none"
    )]
    pub boot_mac_address: Option<String>,

    /// Hardware initialization method during boot. Defaults to UEFI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boot_mode: Option<BootMode>,
}

/// Boot mode of the system
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
pub enum BootMode {
    /// UEFI firmware boot
    #[default]
    #[serde(rename = "UEFI")]
    UEFI,

    /// Legacy BIOS boot
    #[serde(rename = "legacy")]
    Legacy,
}

/// Image to provision, with its published checksum.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    /// Location of the image to deploy
    pub url: String,

    /// Checksum for the image
    pub checksum: String,

    /// Checksum algorithm for the image. Defaults to md5.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum_type: Option<ChecksumType>,
}

/// Checksum algorithm name
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumType {
    /// MD5 checksum
    #[default]
    Md5,

    /// SHA256 checksum
    Sha256,

    /// SHA512 checksum
    Sha512,
}

/// Cloud-init file content encoding
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum Encoding {
    /// Contents are base64 encoded
    #[serde(rename = "base64")]
    Base64,

    /// Contents are gzip encoded
    #[serde(rename = "gzip")]
    Gzip,

    /// Contents are gzip encoded, then base64 encoded
    #[serde(rename = "gzip+base64")]
    GzipBase64,
}

impl Encoding {
    /// The tag emitted into the rendered document.
    pub fn as_str(self) -> &'static str {
        match self {
            Encoding::Base64 => "base64",
            Encoding::Gzip => "gzip",
            Encoding::GzipBase64 => "gzip+base64",
        }
    }
}

/// Output format of the bootstrap document
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
pub enum Format {
    /// cloud-config document
    #[default]
    #[serde(rename = "cloud-config")]
    CloudConfig,
}

/// Input for generating a write_files entry in the bootstrap document.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct File {
    /// Full path on disk where the file is stored
    pub path: String,

    /// Ownership of the file, e.g. "root:root"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,

    /// Permissions to assign to the file, e.g. "0640"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<String>,

    /// Encoding of the file contents
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<Encoding>,

    /// Actual content of the file
    pub content: String,
}

/// Input for a generated user in the bootstrap document.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// User name
    pub name: String,

    /// Gecos to use for the user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gecos: Option<String>,

    /// Additional groups for the user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups: Option<String>,

    /// Home directory to use for the user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home_dir: Option<String>,

    /// Whether to mark the user as inactive
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inactive: Option<bool>,

    /// The user's shell
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell: Option<String>,

    /// Hashed password for the user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passwd: Option<String>,

    /// Primary group for the user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_group: Option<String>,

    /// Whether password login should be disabled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_password: Option<bool>,

    /// Sudo rule for the user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sudo: Option<String>,

    /// SSH authorized keys for the user
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ssh_authorized_keys: Vec<String>,
}

/// NTP configuration for the bootstrap document.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NTP {
    /// NTP servers to use
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub servers: Vec<String>,

    /// Whether NTP should be enabled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

impl NodeConfig {
    /// Effective boot mode for the host, defaulting to UEFI.
    pub fn boot_mode(&self) -> BootMode {
        self.spec
            .bmc
            .as_ref()
            .and_then(|bmc| bmc.boot_mode)
            .unwrap_or_default()
    }

    /// Effective checksum algorithm for image validation, defaulting to md5.
    pub fn checksum_type(&self) -> ChecksumType {
        self.spec
            .image
            .as_ref()
            .and_then(|image| image.checksum_type)
            .unwrap_or_default()
    }

    /// True when the BMC and image fields required to create a host are
    /// all present and non-empty.
    pub fn has_host_details(&self) -> bool {
        let bmc_complete = self.spec.bmc.as_ref().is_some_and(|bmc| {
            !bmc.address.is_empty() && !bmc.username.is_empty() && !bmc.password.is_empty()
        });
        let image_complete = self
            .spec
            .image
            .as_ref()
            .is_some_and(|image| !image.url.is_empty() && !image.checksum.is_empty());
        bmc_complete && image_complete
    }
}

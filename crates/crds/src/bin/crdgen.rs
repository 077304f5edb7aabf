//! Prints the NodeConfig CRD manifest as YAML for cluster installation.
//!
//! The BareMetalHost CRD is owned and installed by the host-management
//! subsystem (metal3) and is deliberately not emitted here.

use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&crds::NodeConfig::crd())?);
    Ok(())
}

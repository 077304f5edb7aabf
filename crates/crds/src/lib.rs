//! metalinit CRD Definitions
//!
//! Kubernetes Custom Resource Definitions for the metalinit controllers.

pub mod bare_metal_host;
pub mod node_config;
pub mod references;

pub use bare_metal_host::*;
pub use node_config::*;
pub use references::*;

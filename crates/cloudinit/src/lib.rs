//! Cloud-init bootstrap document rendering
//!
//! Renders a node's first-boot customization (extra files, commands,
//! users, NTP) into a cloud-config document. Rendering is pure and
//! deterministic: the same input always yields byte-identical output,
//! and optional fields are omitted entirely rather than emitted as
//! null or empty values.

mod builder;

pub use builder::{CLOUD_CONFIG_HEADER, NodeInput, build_node_document};

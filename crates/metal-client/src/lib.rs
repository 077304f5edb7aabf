//! Declarative-store client
//!
//! Typed access to the resources the metalinit controllers read and
//! mutate: `NodeConfig` records, `BareMetalHost` descriptors, and the
//! secrets that carry bootstrap documents and BMC credentials.
//!
//! All operations go through [`MetalClientTrait`] so reconcilers can be
//! unit tested against [`MockMetalClient`] (behind the `test-util`
//! feature) without a running cluster.
//!
//! # Example
//!
//! ```no_run
//! use metal_client::{MetalClient, MetalClientTrait};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let kube_client = kube::Client::try_default().await?;
//! let store = MetalClient::new(kube_client);
//!
//! if let Some(config) = store.get_node_config("default", "node-0").await? {
//!     println!("found {:?}", config.metadata.name);
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
#[path = "trait.rs"]
pub mod metal_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::MetalClient;
pub use error::MetalError;
pub use metal_trait::MetalClientTrait;
#[cfg(feature = "test-util")]
pub use mock::MockMetalClient;

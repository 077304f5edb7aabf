//! NodeConfig Controller
//!
//! Bootstraps bare-metal nodes from declarative NodeConfig records:
//! - Renders each record's cloud-init customization into a bootstrap
//!   document stored as a secret
//! - Creates the backing BareMetalHost and its BMC credential secret
//! - Binds image and user data onto the host once it is fit to provision
//!
//! Records converge idempotently: every pass re-derives its next step
//! from observed cluster state.

mod backoff;
mod config_manager;
mod controller;
mod error;
mod reconciler;
mod reconciler_test;
mod watcher;

use crate::error::ControllerError;
use controller::Controller;
use std::env;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt::init();

    info!("Starting NodeConfig Controller");

    // Load configuration from environment variables
    let namespace = env::var("WATCH_NAMESPACE").ok();

    info!("Configuration:");
    info!(
        "  Namespace: {}",
        namespace.as_deref().unwrap_or("default")
    );

    // Initialize and run controller
    let controller = Controller::new(namespace).await?;
    controller.run().await?;

    Ok(())
}

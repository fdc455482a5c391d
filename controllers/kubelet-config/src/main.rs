//! Kubelet Config Controller
//!
//! Renders one kubelet MachineConfig per MachineConfigPool from the cluster
//! FeatureGate policy and the KubeletConfig overrides selecting the pool.
//!
//! Generated objects are named `99-<pool>-generated-kubelet`; pools still
//! carrying an object under the older uid-based name are migrated by creating
//! the new one next to it.

mod backoff;
mod config;
mod controller;
mod dispatcher;
mod error;
mod metrics;
mod reconciler;
mod snapshot;
mod status;
mod watcher;

#[cfg(test)]
mod test_utils;

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use controller::Controller;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| ControllerError::InvalidConfig("failed to install rustls crypto provider".to_string()))?;

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting Kubelet Config Controller v{}", env!("CARGO_PKG_VERSION"));

    let config = ControllerConfig::from_env()?;

    info!("Configuration:");
    info!("  Platform: {:?}", config.platform);
    info!("  Cluster DNS IP: {}", config.cluster_dns_ip);
    info!("  Workers: {}", config.worker_count);
    info!(
        "  Conflict retries: {} (base delay {:?})",
        config.conflict_retry_limit, config.conflict_retry_delay
    );
    info!("  Metrics address: {}", config.metrics_addr);

    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}

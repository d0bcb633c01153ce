//! censusd — LAN peer discovery daemon.

use anyhow::{Context, Result};

use census_core::config::CensusConfig;
use census_core::identity::{display_id, Identity};

mod ingest;
mod node;
mod presence;
mod status;

use node::Census;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load config
    if let Err(e) = CensusConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = CensusConfig::load().context("failed to load config")?;
    config.validate().context("invalid configuration")?;

    // Identity
    let hostname = nix::unistd::gethostname()
        .map(|h| h.to_string_lossy().into_owned())
        .map_err(|e| tracing::warn!(error = %e, "failed to read hostname"))
        .ok();
    let identity = Identity::resolve(&config, hostname.as_deref())
        .context("failed to establish node identity")?;
    tracing::info!(
        node_id = %display_id(&identity.node_id),
        group = %config.swarm.group,
        protocol = %identity.protocol,
        "identity ready"
    );

    let census = Census::start(&config, identity)?;
    tracing::info!(addr = %census.local_addr(), "listening for beacons");
    let shutdown = census.shutdown_handle();

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    // Status HTTP endpoint
    if config.network.api_port != 0 {
        let state = status::StatusState {
            registry: census.registry().clone(),
            node_id: display_id(&census.identity().node_id),
            protocol: census.identity().protocol,
        };
        let port = config.network.api_port;
        let rx = shutdown.subscribe();
        tokio::spawn(async move {
            if let Err(e) = status::serve(state, port, rx).await {
                tracing::error!(error = %e, "status server failed");
            }
        });
    }

    let peers = census.node_count();
    census.wait().await?;
    tracing::info!(peers = peers.get(), "census stopped");
    Ok(())
}

//! Eviction sweeper.
//!
//! Once per second, drop registry entries that have outlived the
//! staleness threshold. There is no leave message in the protocol, so
//! this is the only way a peer disappears.

use std::time::Duration;

use anyhow::Result;
use tokio::sync::broadcast;

use census_core::identity::short_id;
use census_services::NodeRegistry;

pub const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

pub async fn sweep_loop(registry: NodeRegistry, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
    let mut interval = tokio::time::interval(SWEEP_INTERVAL);

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("eviction sweeper shutting down");
                return Ok(());
            }
            _ = interval.tick() => {
                let evicted = registry.evict_stale().await;
                for node_id in &evicted {
                    tracing::info!(node = %short_id(node_id), "node went away");
                }
                if !evicted.is_empty() {
                    tracing::debug!(
                        removed = evicted.len(),
                        peers = registry.node_count().get(),
                        "swept stale registry entries"
                    );
                }
            }
        }
    }
}

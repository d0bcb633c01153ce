//! Beacon ingestion pipeline.
//!
//!   reader ──raw──▶ validator ──ids──▶ updater ──▶ NodeRegistry
//!
//! Each stage is its own task. Queues are bounded, so a slow stage pushes
//! back on the one before it. Only the reader watches the shutdown signal;
//! when it exits its sender drops and the closure cascades downstream.

pub mod socket;

use anyhow::Result;
use bytes::Bytes;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::Instrument;

use census_core::identity::short_id;
use census_core::wire::{Codec, Decoded, NodeId, MAX_DATAGRAM};
use census_services::{NodeRegistry, Sighting};

use socket::{Endpoint, ResilientSocket};

/// Join handles for the three pipeline stages.
pub struct Pipeline {
    /// Resolves to an error if the listener socket became unusable.
    pub reader: JoinHandle<Result<()>>,
    pub validator: JoinHandle<()>,
    pub updater: JoinHandle<()>,
}

impl Pipeline {
    pub fn spawn<E: Endpoint + 'static>(
        socket: ResilientSocket<E>,
        codec: Codec,
        registry: NodeRegistry,
        queue_capacity: usize,
        shutdown: broadcast::Receiver<()>,
        span: tracing::Span,
    ) -> Self {
        let (raw_tx, raw_rx) = mpsc::channel::<Bytes>(queue_capacity);
        let (id_tx, id_rx) = mpsc::channel::<NodeId>(queue_capacity);

        Self {
            reader: tokio::spawn(read_stage(socket, raw_tx, shutdown).instrument(span.clone())),
            validator: tokio::spawn(validate_stage(codec, raw_rx, id_tx).instrument(span.clone())),
            updater: tokio::spawn(update_stage(registry, id_rx).instrument(span)),
        }
    }
}

/// Stage 1: pull datagrams off the socket.
async fn read_stage<E: Endpoint>(
    mut socket: ResilientSocket<E>,
    raw_tx: mpsc::Sender<Bytes>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let mut buf = vec![0u8; MAX_DATAGRAM];

    tracing::info!("beacon reader starting");

    loop {
        let len = tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("beacon reader shutting down");
                return Ok(());
            }
            result = socket.read(&mut buf) => match result {
                Ok(len) => len,
                Err(e) => {
                    tracing::error!(error = %e, "beacon listener unusable");
                    return Err(e.into());
                }
            },
        };

        let payload = Bytes::copy_from_slice(&buf[..len]);
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("beacon reader shutting down");
                return Ok(());
            }
            sent = raw_tx.send(payload) => {
                if sent.is_err() {
                    tracing::debug!("validator gone, beacon reader exiting");
                    return Ok(());
                }
            }
        }
    }
}

/// Stage 2: decode, drop foreign-swarm beacons, echoes, and garbage.
async fn validate_stage(
    codec: Codec,
    mut raw_rx: mpsc::Receiver<Bytes>,
    id_tx: mpsc::Sender<NodeId>,
) {
    while let Some(payload) = raw_rx.recv().await {
        match codec.decode(&payload) {
            Ok(Decoded::Peer(node_id)) => {
                if id_tx.send(node_id).await.is_err() {
                    break;
                }
            }
            Ok(Decoded::ForeignSwarm) => tracing::trace!("ignoring beacon from another swarm"),
            Ok(Decoded::SelfEcho) => tracing::trace!("ignoring own beacon"),
            Err(e) => tracing::debug!(error = %e, len = payload.len(), "dropping malformed beacon"),
        }
    }
    tracing::debug!("raw beacon queue closed, validator exiting");
}

/// Stage 3: apply sightings to the registry.
async fn update_stage(registry: NodeRegistry, mut id_rx: mpsc::Receiver<NodeId>) {
    while let Some(node_id) = id_rx.recv().await {
        if registry.refresh(node_id).await == Sighting::New {
            tracing::info!(
                node = %short_id(&node_id),
                peers = registry.node_count().get(),
                "new node"
            );
        }
    }
    tracing::debug!("peer queue closed, updater exiting");
}

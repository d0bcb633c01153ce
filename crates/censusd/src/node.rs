//! Census node — wires the transmitter, ingestion pipeline, and sweeper
//! around one shared registry and one shutdown channel.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::Instrument;

use census_core::config::CensusConfig;
use census_core::identity::{display_id, short_id, Identity};
use census_core::wire::Codec;
use census_services::{NodeCount, NodeRegistry};

use crate::ingest::socket::{ResilientSocket, UdpEndpoint};
use crate::ingest::Pipeline;
use crate::presence::{sweep_loop, transmit_loop, Targets};

pub struct Census {
    identity: Identity,
    registry: NodeRegistry,
    local_addr: SocketAddr,
    shutdown: broadcast::Sender<()>,
    pipeline: Pipeline,
    transmitter: JoinHandle<Result<()>>,
    sweeper: JoinHandle<Result<()>>,
}

impl Census {
    /// Bind the listener and start every task. Must run inside a tokio runtime.
    ///
    /// Config is validated first; nothing touches the network if it is
    /// unusable.
    pub fn start(config: &CensusConfig, identity: Identity) -> Result<Self> {
        config.validate().context("invalid configuration")?;

        let targets = match config.network.target_addr()? {
            Some(addr) => Targets::Direct(addr),
            None => Targets::Interfaces {
                port: config.network.port,
            },
        };

        let endpoint = UdpEndpoint::bind(config.network.listen_socket_addr()).with_context(|| {
            format!("failed to bind beacon listener on {}", config.network.listen_socket_addr())
        })?;
        let local_addr = endpoint.local_addr();
        let socket = ResilientSocket::new(
            endpoint,
            config.socket.max_attempts,
            config.socket.backoff(),
        );

        let codec = Codec::new(identity.protocol, identity.swarm_id, identity.node_id);
        let message = codec.encode();
        let registry = NodeRegistry::new();
        let (shutdown, _) = broadcast::channel::<()>(1);

        let span = tracing::info_span!("census", node = %short_id(&identity.node_id));
        tracing::info!(
            parent: &span,
            node_id = %display_id(&identity.node_id),
            protocol = %identity.protocol,
            listen = %local_addr,
            "census node starting"
        );

        let pipeline = Pipeline::spawn(
            socket,
            codec,
            registry.clone(),
            config.pipeline.queue_capacity,
            shutdown.subscribe(),
            span.clone(),
        );
        let transmitter = tokio::spawn(
            transmit_loop(message, targets, registry.clone(), shutdown.subscribe())
                .instrument(span.clone()),
        );
        let sweeper =
            tokio::spawn(sweep_loop(registry.clone(), shutdown.subscribe()).instrument(span));

        Ok(Self {
            identity,
            registry,
            local_addr,
            shutdown,
            pipeline,
            transmitter,
            sweeper,
        })
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn node_count(&self) -> NodeCount {
        self.registry.node_count()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Sending on this stops the node. The status server subscribes to it.
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown.clone()
    }

    /// Wait for every task to finish.
    ///
    /// If the listener socket or the transmitter dies, the other tasks are
    /// stopped and that error is returned.
    pub async fn wait(self) -> Result<()> {
        let (reader, transmitter) =
            supervise(&self.shutdown, self.pipeline.reader, self.transmitter).await?;

        self.pipeline.validator.await.context("beacon validator panicked")?;
        self.pipeline.updater.await.context("registry updater panicked")?;
        let sweeper = self.sweeper.await.context("eviction sweeper panicked")?;

        reader.context("beacon listener failed")?;
        transmitter.context("beacon transmitter failed")?;
        sweeper?;
        Ok(())
    }
}

/// Join the reader and transmitter. Whichever fails first stops the node.
async fn supervise(
    shutdown: &broadcast::Sender<()>,
    mut reader: JoinHandle<Result<()>>,
    mut transmitter: JoinHandle<Result<()>>,
) -> Result<(Result<()>, Result<()>)> {
    tokio::select! {
        r = &mut reader => {
            let r = r.context("beacon reader panicked")?;
            if r.is_err() {
                let _ = shutdown.send(());
            }
            let t = transmitter.await.context("beacon transmitter panicked")?;
            Ok((r, t))
        }
        t = &mut transmitter => {
            let t = t.context("beacon transmitter panicked")?;
            if t.is_err() {
                tracing::error!("beacon transmitter failed, stopping node");
                let _ = shutdown.send(());
            }
            let r = reader.await.context("beacon reader panicked")?;
            Ok((r, t))
        }
    }
}

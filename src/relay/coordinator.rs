//! Bridging a downstream connection pool to dialed upstream peers.
//!
//! The coordinator accepts downstream peers like a server and, on a
//! `Connect` request, dials the named endpoint, registers the new upstream
//! connection, and answers the originator with `Connected` carrying the
//! upstream connection's identity. Heartbeats terminate at each hop; the
//! registries' dispatch answers pings on both sides.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::client::dial;
use crate::config::NodeConfig;
use crate::core::RelayError;
use crate::server::MeshServer;
use crate::transport::{ConnectionRegistry, HeartbeatMonitor, RegistryEvent};
use crate::wire::{Packet, PacketKind};

/// Events from either side of the relay.
#[derive(Debug)]
pub enum RelayEvent {
    /// An event from the accepting (downstream) registry.
    Downstream(RegistryEvent),
    /// An event from the dialed (upstream) registry.
    Upstream(RegistryEvent),
}

/// A relay node bridging two connection registries.
pub struct RelayCoordinator {
    server: MeshServer,
    upstream: Arc<ConnectionRegistry>,
}

impl RelayCoordinator {
    /// Bind the downstream listener and start the bridge loops.
    ///
    /// Returns the coordinator and a merged event stream over both sides.
    pub async fn bind(
        config: NodeConfig,
    ) -> Result<(Self, mpsc::Receiver<RelayEvent>), RelayError> {
        let (server, downstream_rx) = MeshServer::bind(config.clone()).await?;
        let cancel = server.cancel_token().clone();

        let (upstream, upstream_rx) = ConnectionRegistry::new(config.event_buffer);
        HeartbeatMonitor::new(Arc::clone(&upstream), config.heartbeat_interval, &cancel).spawn();

        let (event_tx, event_rx) = mpsc::channel(config.event_buffer);

        tokio::spawn(downstream_loop(
            Arc::clone(server.registry()),
            downstream_rx,
            Arc::clone(&upstream),
            config,
            cancel.clone(),
            event_tx.clone(),
        ));
        tokio::spawn(upstream_loop(upstream_rx, event_tx));

        Ok((Self { server, upstream }, event_rx))
    }

    /// The downstream listener address.
    pub fn local_addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    /// The downstream (accepted) registry.
    pub fn downstream(&self) -> &Arc<ConnectionRegistry> {
        self.server.registry()
    }

    /// The upstream (dialed) registry.
    pub fn upstream(&self) -> &Arc<ConnectionRegistry> {
        &self.upstream
    }

    /// Stop both sides and close every connection.
    pub async fn shutdown(&self) {
        self.server.shutdown().await;
        self.upstream.shutdown().await;
    }
}

impl std::fmt::Debug for RelayCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayCoordinator")
            .field("local_addr", &self.server.local_addr())
            .finish_non_exhaustive()
    }
}

/// Watch downstream events, bridging `Connect` requests as they arrive.
async fn downstream_loop(
    downstream: Arc<ConnectionRegistry>,
    mut events: mpsc::Receiver<RegistryEvent>,
    upstream: Arc<ConnectionRegistry>,
    config: NodeConfig,
    cancel: CancellationToken,
    relay_events: mpsc::Sender<RelayEvent>,
) {
    while let Some(event) = events.recv().await {
        if let RegistryEvent::PacketReceived { identity, packet } = &event {
            if packet.kind == PacketKind::Connect {
                tokio::spawn(handle_connect(
                    Arc::clone(&downstream),
                    *identity,
                    packet.clone(),
                    Arc::clone(&upstream),
                    config.clone(),
                    cancel.clone(),
                ));
            }
        }
        if relay_events.send(RelayEvent::Downstream(event)).await.is_err() {
            return;
        }
    }
}

/// Forward upstream registry events to the merged stream.
async fn upstream_loop(
    mut events: mpsc::Receiver<RegistryEvent>,
    relay_events: mpsc::Sender<RelayEvent>,
) {
    while let Some(event) = events.recv().await {
        if relay_events.send(RelayEvent::Upstream(event)).await.is_err() {
            return;
        }
    }
}

/// Open one upstream connection on behalf of a downstream peer.
///
/// Failure never answers the originator with a packet: a `Connected` only
/// arrives on success, and the downstream connection itself stays up.
async fn handle_connect(
    downstream: Arc<ConnectionRegistry>,
    origin: Uuid,
    request: Packet,
    upstream: Arc<ConnectionRegistry>,
    config: NodeConfig,
    cancel: CancellationToken,
) {
    if let Err(err) = bridge(&downstream, origin, &request, &upstream, &config, &cancel).await {
        warn!(%origin, error = %err, "connect bridging failed");
    }
}

/// Dial the requested endpoint, register it upstream, and answer the
/// originator with the new connection's identity.
async fn bridge(
    downstream: &Arc<ConnectionRegistry>,
    origin: Uuid,
    request: &Packet,
    upstream: &Arc<ConnectionRegistry>,
    config: &NodeConfig,
    cancel: &CancellationToken,
) -> Result<(), RelayError> {
    let endpoint: SocketAddr = request.endpoint().map_err(|_| {
        RelayError::BadEndpoint(String::from_utf8_lossy(&request.payload).into_owned())
    })?;

    let (connection, events) = dial(endpoint, config, cancel).await?;
    let upstream_identity = connection.identity();
    if !upstream.register(Arc::clone(&connection), events).await {
        warn!(identity = %upstream_identity, "duplicate upstream identity, discarding");
        connection.close().await;
        return Ok(());
    }
    debug!(%origin, %endpoint, upstream = %upstream_identity, "bridged connect request");

    if let Some(originator) = downstream.get(origin).await {
        let _ = originator.send(&Packet::connected(upstream_identity)).await;
    }
    Ok(())
}

//! Identity-keyed connection registry.
//!
//! The registry is the exclusive owner of every registered connection. It
//! wires each connection's event stream into a single registry-wide event
//! channel, answers heartbeat probes, and guarantees that concurrent
//! register/remove/iterate never observe a torn map.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::wire::{Packet, PacketKind};

use super::connection::{Connection, ConnectionEvent, DisconnectKind, PongOutcome};

/// Events dispatched to registry subscribers.
#[derive(Debug)]
pub enum RegistryEvent {
    /// A connection was registered.
    Connected {
        /// The new connection's identity.
        identity: Uuid,
    },
    /// A registered connection delivered a packet.
    PacketReceived {
        /// The originating connection.
        identity: Uuid,
        /// The decrypted packet.
        packet: Packet,
    },
    /// A registered connection ended. Fired exactly once per connection.
    Disconnected {
        /// The identity that was removed.
        identity: Uuid,
        /// How the connection ended.
        kind: DisconnectKind,
    },
}

/// Concurrent-safe identity→connection map with event dispatch.
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<Uuid, Arc<Connection>>>,
    events: mpsc::Sender<RegistryEvent>,
}

impl ConnectionRegistry {
    /// Create a registry and the receiving end of its event channel.
    pub fn new(event_buffer: usize) -> (Arc<Self>, mpsc::Receiver<RegistryEvent>) {
        let (events, event_rx) = mpsc::channel(event_buffer);
        (
            Arc::new(Self {
                connections: RwLock::new(HashMap::new()),
                events,
            }),
            event_rx,
        )
    }

    /// Register a connection and start dispatching its events.
    ///
    /// Returns `false` if the identity is already present, in which case the
    /// caller must discard the duplicate connection. On success the registry
    /// fires [`RegistryEvent::Connected`] and becomes the connection's owner.
    pub async fn register(
        self: &Arc<Self>,
        connection: Arc<Connection>,
        events: mpsc::Receiver<ConnectionEvent>,
    ) -> bool {
        let identity = connection.identity();
        {
            let mut connections = self.connections.write().await;
            if connections.contains_key(&identity) {
                return false;
            }
            connections.insert(identity, Arc::clone(&connection));
        }
        debug!(%identity, peer = %connection.remote_addr(), "connection registered");

        let _ = self.events.send(RegistryEvent::Connected { identity }).await;
        tokio::spawn(Arc::clone(self).dispatch(connection, events));
        true
    }

    /// Remove and close a connection.
    ///
    /// Ignored if the identity is absent. The `Disconnected` event follows
    /// through the connection's dispatch task.
    pub async fn force_disconnect(&self, identity: Uuid) {
        let connection = self.connections.write().await.remove(&identity);
        if let Some(connection) = connection {
            debug!(%identity, "forcing disconnect");
            connection.close().await;
        }
    }

    /// Look up a connection by identity.
    pub async fn get(&self, identity: Uuid) -> Option<Arc<Connection>> {
        self.connections.read().await.get(&identity).cloned()
    }

    /// Snapshot of the current connections.
    ///
    /// Safe to call concurrently with register/remove; a removal completed
    /// before the call is never visible in the snapshot.
    pub async fn connections(&self) -> Vec<Arc<Connection>> {
        self.connections.read().await.values().cloned().collect()
    }

    /// Number of registered connections.
    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Whether the registry is empty.
    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }

    /// Send a packet to every registered connection.
    ///
    /// Send failures are left to each connection's own lifecycle handling.
    pub async fn broadcast(&self, packet: &Packet) {
        for connection in self.connections().await {
            if let Err(err) = connection.send(packet).await {
                debug!(identity = %connection.identity(), error = %err, "broadcast send failed");
            }
        }
    }

    /// Close every connection and drop them from the map.
    pub async fn shutdown(&self) {
        let connections: Vec<_> = self.connections.write().await.drain().collect();
        for (_, connection) in connections {
            connection.close().await;
        }
    }

    /// Per-connection dispatch: forwards packets to subscribers, terminates
    /// heartbeats locally, and fires `Disconnected` exactly once.
    async fn dispatch(
        self: Arc<Self>,
        connection: Arc<Connection>,
        mut events: mpsc::Receiver<ConnectionEvent>,
    ) {
        let identity = connection.identity();

        while let Some(event) = events.recv().await {
            match event {
                ConnectionEvent::Packet(packet) => {
                    match packet.kind {
                        PacketKind::Ping => self.answer_ping(&connection, &packet).await,
                        PacketKind::Pong => self.record_pong(&connection, &packet),
                        _ => {}
                    }
                    let _ = self
                        .events
                        .send(RegistryEvent::PacketReceived { identity, packet })
                        .await;
                }
                ConnectionEvent::Disconnected(kind) => {
                    self.connections.write().await.remove(&identity);
                    let _ = self
                        .events
                        .send(RegistryEvent::Disconnected { identity, kind })
                        .await;
                    return;
                }
            }
        }
    }

    /// Answer an incoming heartbeat probe with a pong echoing its nonce.
    async fn answer_ping(&self, connection: &Arc<Connection>, packet: &Packet) {
        match packet.nonce() {
            Ok(nonce) => {
                if let Err(err) = connection.send(&Packet::pong(nonce)).await {
                    debug!(identity = %connection.identity(), error = %err, "pong send failed");
                }
            }
            Err(_) => {
                warn!(identity = %connection.identity(), "ping with malformed nonce");
            }
        }
    }

    /// Route an incoming pong into the connection's pending-ping slot.
    fn record_pong(&self, connection: &Arc<Connection>, packet: &Packet) {
        let Ok(nonce) = packet.nonce() else {
            warn!(identity = %connection.identity(), "pong with malformed nonce");
            return;
        };
        match connection.complete_ping(nonce) {
            PongOutcome::Cleared => {}
            PongOutcome::NoPendingPing => {
                warn!(identity = %connection.identity(), "pong with no ping outstanding");
            }
            PongOutcome::NonceMismatch => {
                warn!(identity = %connection.identity(), "pong nonce mismatch");
            }
        }
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry").finish_non_exhaustive()
    }
}

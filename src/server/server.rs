//! Listener, accept loop, and server lifecycle.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::NodeConfig;
use crate::core::ServerError;
use crate::transport::{Connection, ConnectionRegistry, HeartbeatMonitor, RegistryEvent};

/// An accepting meshwire node.
///
/// Owns the listener task, a [`ConnectionRegistry`] of accepted peers, and a
/// [`HeartbeatMonitor`] over that registry, all stopped by one shared
/// cancellation signal.
pub struct MeshServer {
    config: NodeConfig,
    registry: Arc<ConnectionRegistry>,
    local_addr: SocketAddr,
    cancel: CancellationToken,
}

impl MeshServer {
    /// Bind the listener and start accepting.
    ///
    /// A bind failure is fatal and surfaces synchronously; the server does
    /// not partially start. Returns the server handle and the registry's
    /// event stream.
    pub async fn bind(
        config: NodeConfig,
    ) -> Result<(Self, mpsc::Receiver<RegistryEvent>), ServerError> {
        let listener = TcpListener::bind(config.bind_addr)
            .await
            .map_err(ServerError::Bind)?;
        let local_addr = listener.local_addr()?;

        let cancel = CancellationToken::new();
        let (registry, event_rx) = ConnectionRegistry::new(config.event_buffer);

        HeartbeatMonitor::new(Arc::clone(&registry), config.heartbeat_interval, &cancel).spawn();

        tokio::spawn(accept_loop(
            listener,
            Arc::clone(&registry),
            config.clone(),
            cancel.clone(),
        ));
        debug!(%local_addr, "server listening");

        let server = Self {
            config,
            registry,
            local_addr,
            cancel,
        };
        Ok((server, event_rx))
    }

    /// The address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The registry of accepted connections.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// The server configuration.
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// The cancellation token shared by the accept loop, read loops, and
    /// heartbeat.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Stop accepting, close every connection, and stop the heartbeat.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.registry.shutdown().await;
    }
}

impl Drop for MeshServer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Accept sockets until cancelled; each is handshaken and registered off
/// the accept path so a slow peer cannot stall accepting.
async fn accept_loop(
    listener: TcpListener,
    registry: Arc<ConnectionRegistry>,
    config: NodeConfig,
    cancel: CancellationToken,
) {
    loop {
        let accepted = tokio::select! {
            _ = cancel.cancelled() => return,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer)) => {
                debug!(%peer, "accepted socket");
                tokio::spawn(admit(
                    stream,
                    Arc::clone(&registry),
                    config.clone(),
                    cancel.clone(),
                ));
            }
            Err(err) => {
                warn!(error = %err, "accept failed");
            }
        }
    }
}

/// Handshake one accepted socket and hand it to the registry.
async fn admit(
    stream: TcpStream,
    registry: Arc<ConnectionRegistry>,
    config: NodeConfig,
    cancel: CancellationToken,
) {
    let peer = stream.peer_addr().ok();
    match Connection::establish(stream, &config, &cancel).await {
        Ok((connection, events)) => {
            if !registry.register(Arc::clone(&connection), events).await {
                // Identity collision; discard the duplicate.
                warn!(identity = %connection.identity(), "duplicate identity, discarding");
                connection.close().await;
            }
        }
        Err(err) => {
            warn!(peer = ?peer, error = %err, "handshake failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback_config() -> NodeConfig {
        NodeConfig::builder()
            .bind_addr("127.0.0.1:0".parse().unwrap())
            .build()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_bind_reports_local_addr() {
        let (server, _events) = MeshServer::bind(loopback_config()).await.unwrap();
        assert_ne!(server.local_addr().port(), 0);
        server.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_bind_conflict_is_fatal() {
        let (server, _events) = MeshServer::bind(loopback_config()).await.unwrap();

        let conflicting = NodeConfig::builder().bind_addr(server.local_addr()).build();
        assert!(matches!(
            MeshServer::bind(conflicting).await,
            Err(ServerError::Bind(_))
        ));
        server.shutdown().await;
    }
}

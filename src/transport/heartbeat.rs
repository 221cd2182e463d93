//! Heartbeat monitor: periodic ping sweep with timeout-based disconnection.
//!
//! Every tick, each registered connection either receives a fresh `Ping`
//! (nonce recorded as its pending ping) or, if the previous tick's ping was
//! never answered, is queued for forced disconnection. A peer that never
//! answers is disconnected within two intervals at most, one at minimum.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::wire::Packet;

use super::registry::ConnectionRegistry;

/// Periodically pings every connection in a registry.
pub struct HeartbeatMonitor {
    registry: Arc<ConnectionRegistry>,
    interval: std::time::Duration,
    cancel: CancellationToken,
}

impl HeartbeatMonitor {
    /// Create a monitor over `registry`.
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        interval: std::time::Duration,
        cancel: &CancellationToken,
    ) -> Self {
        Self {
            registry,
            interval,
            cancel: cancel.child_token(),
        }
    }

    /// Spawn the sweep loop.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Run sweeps until cancelled.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        // The immediate first tick would ping before peers settle.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = ticker.tick() => self.sweep().await,
            }
        }
    }

    /// One heartbeat pass over the registry.
    async fn sweep(&self) {
        let mut stale: Vec<Uuid> = Vec::new();

        for connection in self.registry.connections().await {
            let nonce = Uuid::new_v4();
            if connection.begin_ping(nonce) {
                if let Err(err) = connection.send(&Packet::ping(nonce)).await {
                    debug!(
                        identity = %connection.identity(),
                        error = %err,
                        "ping send failed"
                    );
                }
            } else {
                // The previous probe is still unanswered.
                stale.push(connection.identity());
            }
        }

        for identity in stale {
            warn!(%identity, "heartbeat timeout, forcing disconnect");
            self.registry.force_disconnect(identity).await;
        }
    }
}

impl std::fmt::Debug for HeartbeatMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeartbeatMonitor")
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

//! Connection lifecycle and I/O.
//!
//! A [`Connection`] owns one TCP socket, composes a [`FrameReader`] with an
//! [`EncryptionSession`], and exposes a serialized send path plus a stream
//! of [`ConnectionEvent`]s produced by its read loop.

use std::net::SocketAddr;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Instant;

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, mpsc};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::NodeConfig;
use crate::core::{ConnectionError, KEY_EXCHANGE_SIZE, READ_BUFFER_SIZE};
use crate::crypto::EncryptionSession;
use crate::wire::{FrameReader, Packet, PacketKind, encode_frame};

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// TCP established, key exchange not yet started.
    Connecting = 0,
    /// Key exchange in flight.
    Handshaking = 1,
    /// Session negotiated; application packets may flow.
    Ready = 2,
    /// Socket closed or connection torn down.
    Closed = 3,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Handshaking,
            2 => Self::Ready,
            _ => Self::Closed,
        }
    }
}

/// How a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectKind {
    /// The stream ended on a frame boundary (or the connection was closed
    /// deliberately).
    Clean,
    /// The stream ended mid-frame, or a protocol violation forced the close.
    Abrupt,
}

/// Events emitted by a connection's read loop, in arrival order.
#[derive(Debug)]
pub enum ConnectionEvent {
    /// A decrypted packet arrived.
    Packet(Packet),
    /// The connection ended. Fired exactly once per connection lifetime.
    Disconnected(DisconnectKind),
}

/// A heartbeat probe awaiting its answer.
#[derive(Debug, Clone, Copy)]
pub struct PendingPing {
    /// The nonce carried by the probe.
    pub nonce: Uuid,
    /// When the probe was issued.
    pub issued_at: Instant,
}

/// Outcome of matching an incoming Pong against the pending ping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PongOutcome {
    /// The nonce matched; the pending ping is cleared.
    Cleared,
    /// No ping was outstanding; the pong is ignored.
    NoPendingPing,
    /// The nonce did not match; the pending ping stays outstanding.
    NonceMismatch,
}

/// One encrypted connection to a peer.
///
/// The identity is a locally generated UUID assigned at construction; it is
/// the registry key and is never negotiated with the peer.
pub struct Connection {
    identity: Uuid,
    remote_addr: SocketAddr,
    state: AtomicU8,
    session: EncryptionSession,
    writer: Mutex<OwnedWriteHalf>,
    pending_ping: StdMutex<Option<PendingPing>>,
    cancel: CancellationToken,
}

impl Connection {
    /// Perform the key exchange on a fresh TCP stream and start the read
    /// loop.
    ///
    /// Both peers send their 48-byte bootstrap message immediately and then
    /// read the peer's; the exchange is ordering-independent and is the only
    /// unencrypted traffic on the socket. Returns the connection and the
    /// receiving end of its event stream.
    pub async fn establish(
        stream: TcpStream,
        config: &NodeConfig,
        cancel: &CancellationToken,
    ) -> Result<(Arc<Self>, mpsc::Receiver<ConnectionEvent>), ConnectionError> {
        let remote_addr = stream.peer_addr()?;
        let (mut read_half, mut write_half) = stream.into_split();

        let mut session = EncryptionSession::new();
        let state = AtomicU8::new(ConnectionState::Handshaking as u8);

        write_half
            .write_all(&session.build_key_exchange_message())
            .await?;
        write_half.flush().await?;

        let mut exchange = [0u8; KEY_EXCHANGE_SIZE];
        timeout(
            config.handshake_timeout,
            read_half.read_exact(&mut exchange),
        )
        .await
        .map_err(|_| ConnectionError::HandshakeTimeout)??;

        let (remote_public, remote_iv) = EncryptionSession::parse_key_exchange_message(&exchange)?;
        session.accept_remote_keys(remote_public, remote_iv)?;
        state.store(ConnectionState::Ready as u8, Ordering::SeqCst);

        let connection = Arc::new(Self {
            identity: Uuid::new_v4(),
            remote_addr,
            state,
            session,
            writer: Mutex::new(write_half),
            pending_ping: StdMutex::new(None),
            cancel: cancel.child_token(),
        });
        debug!(identity = %connection.identity, peer = %remote_addr, "connection ready");

        let (event_tx, event_rx) = mpsc::channel(config.event_buffer);
        tokio::spawn(read_loop(Arc::clone(&connection), read_half, event_tx));

        Ok((connection, event_rx))
    }

    /// The locally generated identity naming this connection.
    pub fn identity(&self) -> Uuid {
        self.identity
    }

    /// The peer's socket address.
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Encrypt and write one packet.
    ///
    /// Writes are serialized; two concurrent sends can never interleave
    /// within the frame stream. A write failure closes the connection.
    pub async fn send(&self, packet: &Packet) -> Result<(), ConnectionError> {
        match self.state() {
            ConnectionState::Ready => {}
            ConnectionState::Closed => return Err(ConnectionError::Closed),
            _ => return Err(ConnectionError::NotReady),
        }

        if let Err(err) = self.write_packet(packet).await {
            self.close().await;
            return Err(err);
        }
        Ok(())
    }

    /// Send a `BeginIdentity`/`Identity`/`ChannelIdentity…`/`EndIdentity`
    /// batch announcing this node.
    pub async fn send_identity_batch(
        &self,
        name: &str,
        channels: &[(Uuid, String)],
    ) -> Result<(), ConnectionError> {
        self.send(&Packet::begin_identity()).await?;
        self.send(&Packet::identity(name)).await?;
        for (channel, channel_name) in channels {
            self.send(&Packet::channel_identity(*channel, channel_name))
                .await?;
        }
        self.send(&Packet::end_identity()).await
    }

    /// Write path without the state gate, used by `send` and by `close`'s
    /// best-effort disconnect notice.
    async fn write_packet(&self, packet: &Packet) -> Result<(), ConnectionError> {
        let (iv, ciphertext) = self.session.encrypt(&packet.encode())?;
        let frame = encode_frame(&iv, &ciphertext);

        let mut writer = self.writer.lock().await;
        writer.write_all(&frame).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Close the connection. Idempotent.
    ///
    /// Sends a best-effort `Disconnect` notice, stops the read loop, and
    /// shuts the socket down. The read loop fires the `Disconnected` event.
    pub async fn close(&self) {
        let previous = self
            .state
            .swap(ConnectionState::Closed as u8, Ordering::SeqCst);
        if previous == ConnectionState::Closed as u8 {
            return;
        }

        if previous == ConnectionState::Ready as u8 {
            let _ = self.write_packet(&Packet::disconnect()).await;
        }
        self.cancel.cancel();
        let _ = self.writer.lock().await.shutdown().await;
        debug!(identity = %self.identity, "connection closed");
    }

    /// Record a fresh pending ping. Returns `false` (without overwriting)
    /// if one is already outstanding.
    pub(crate) fn begin_ping(&self, nonce: Uuid) -> bool {
        let mut pending = self.pending_ping.lock().expect("pending ping lock");
        if pending.is_some() {
            return false;
        }
        *pending = Some(PendingPing {
            nonce,
            issued_at: Instant::now(),
        });
        true
    }

    /// Match an incoming pong nonce against the pending ping.
    pub(crate) fn complete_ping(&self, nonce: Uuid) -> PongOutcome {
        let mut pending = self.pending_ping.lock().expect("pending ping lock");
        match *pending {
            None => PongOutcome::NoPendingPing,
            Some(ping) if ping.nonce == nonce => {
                *pending = None;
                PongOutcome::Cleared
            }
            Some(_) => PongOutcome::NonceMismatch,
        }
    }

    /// Whether a heartbeat probe is still unanswered.
    pub(crate) fn has_pending_ping(&self) -> bool {
        self.pending_ping.lock().expect("pending ping lock").is_some()
    }

    fn mark_closed(&self) {
        self.state
            .store(ConnectionState::Closed as u8, Ordering::SeqCst);
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("identity", &self.identity)
            .field("remote_addr", &self.remote_addr)
            .field("state", &self.state())
            .finish()
    }
}

/// Per-connection read loop: socket bytes → FrameReader → events.
///
/// The single emitter of `ConnectionEvent::Disconnected`.
async fn read_loop(
    connection: Arc<Connection>,
    mut read_half: OwnedReadHalf,
    events: mpsc::Sender<ConnectionEvent>,
) {
    let mut reader = FrameReader::new();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    let kind = 'outer: loop {
        let read = tokio::select! {
            _ = connection.cancel.cancelled() => break DisconnectKind::Clean,
            read = read_half.read(&mut buf) => read,
        };

        match read {
            Ok(0) => {
                break if reader.has_partial_frame() {
                    DisconnectKind::Abrupt
                } else {
                    DisconnectKind::Clean
                };
            }
            Ok(n) => match reader.feed(&buf[..n], &connection.session) {
                Ok(packets) => {
                    for packet in packets {
                        let graceful = packet.kind == PacketKind::Disconnect;
                        if events.send(ConnectionEvent::Packet(packet)).await.is_err() {
                            // Nobody is listening anymore.
                            break 'outer DisconnectKind::Clean;
                        }
                        if graceful {
                            break 'outer DisconnectKind::Clean;
                        }
                    }
                }
                Err(err) => {
                    warn!(
                        identity = %connection.identity,
                        peer = %connection.remote_addr,
                        error = %err,
                        "dropping connection on corrupt stream"
                    );
                    break DisconnectKind::Abrupt;
                }
            },
            Err(err) => {
                debug!(
                    identity = %connection.identity,
                    error = %err,
                    "socket read failed"
                );
                break DisconnectKind::Abrupt;
            }
        }
    };

    connection.mark_closed();
    let _ = events.send(ConnectionEvent::Disconnected(kind)).await;
}

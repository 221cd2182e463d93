//! Error types for the meshwire protocol.

use thiserror::Error;

/// Errors in the wire codec layer.
///
/// Everything here is either corruption (fatal for the connection) or a
/// malformed packet; "not enough bytes yet" is never an error and is
/// signalled separately by the codec.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WireError {
    /// Frame header carries the wrong alignment marker; the stream has
    /// desynchronized and the connection cannot recover.
    #[error("bad alignment marker: expected 0x{expected:08x}, found 0x{found:08x}")]
    BadAlignmentMarker {
        /// The fixed protocol marker.
        expected: u32,
        /// The marker actually read.
        found: u32,
    },

    /// Declared frame length is smaller than the frame header itself.
    #[error("declared frame length {0} is below the minimum frame size")]
    FrameTooShort(u32),

    /// Declared frame length exceeds the protocol maximum.
    #[error("declared frame length {0} exceeds the maximum frame size")]
    FrameTooLarge(u32),

    /// Decrypted payload is too short to hold a packet header.
    #[error("truncated packet: {0} bytes is below the packet header size")]
    TruncatedPacket(usize),

    /// Packet kind byte does not decode to a known variant.
    #[error("unknown packet kind: 0x{0:02x}")]
    UnknownPacketKind(u8),

    /// A structured payload (nonce, endpoint, identity) failed to parse.
    #[error("invalid {0} payload")]
    InvalidPayload(&'static str),
}

/// Errors in the crypto layer.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Encrypt/decrypt was attempted before the key exchange completed.
    #[error("encryption session not negotiated")]
    NotNegotiated,

    /// `accept_remote_keys` was called a second time on the same session.
    #[error("encryption session already negotiated")]
    AlreadyNegotiated,

    /// The peer's key exchange message was malformed or degenerate.
    #[error("malformed key exchange message")]
    MalformedKeyExchange,

    /// AEAD encryption failed.
    #[error("encryption failed")]
    EncryptFailed,

    /// AEAD decryption failed (bad tag, wrong key, or corrupted ciphertext).
    #[error("decryption failed (invalid tag or corrupted ciphertext)")]
    DecryptFailed,
}

/// Errors scoped to a single connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// `send` was called before the handshake completed.
    #[error("connection is not ready")]
    NotReady,

    /// The connection has already been closed.
    #[error("connection closed")]
    Closed,

    /// The peer never sent its key exchange within the handshake timeout.
    #[error("handshake timed out")]
    HandshakeTimeout,

    /// Every dial attempt failed.
    #[error("connect failed after {attempts} attempts: {last}")]
    ConnectFailed {
        /// Number of attempts made.
        attempts: u32,
        /// The error from the final attempt.
        #[source]
        last: std::io::Error,
    },

    /// Wire corruption on this connection.
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// Crypto failure on this connection.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Socket I/O failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the accepting server role.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind the listener; the module does not partially start.
    #[error("bind failed: {0}")]
    Bind(#[source] std::io::Error),

    /// I/O error in the accept loop.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the relay coordinator.
#[derive(Debug, Error)]
pub enum RelayError {
    /// A Connect packet carried an endpoint that does not parse.
    #[error("bad relay endpoint: {0}")]
    BadEndpoint(String),

    /// Dialing the requested upstream failed.
    #[error("upstream connect failed: {0}")]
    Upstream(#[from] ConnectionError),

    /// The downstream server failed to start.
    #[error("server error: {0}")]
    Server(#[from] ServerError),
}

/// Top-level meshwire errors.
#[derive(Debug, Error)]
pub enum MeshwireError {
    /// Wire codec error.
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// Crypto error.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Connection error.
    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Server error.
    #[error("server error: {0}")]
    Server(#[from] ServerError),

    /// Relay error.
    #[error("relay error: {0}")]
    Relay(#[from] RelayError),

    /// I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

//! Protocol constants.
//!
//! These values are fixed by the wire protocol and MUST NOT be changed.

use std::time::Duration;

// =============================================================================
// FRAME LAYOUT
// =============================================================================

/// Alignment marker embedded in every frame header ("MW01").
///
/// A mismatch means the byte stream has desynchronized; the connection is
/// unrecoverable.
pub const ALIGNMENT_MARKER: u32 = 0x4D57_3031;

/// Initialization vector size carried in every frame header.
pub const IV_SIZE: usize = 16;

/// Frame header size: total_length (4) + alignment_marker (4) + IV (16).
pub const FRAME_HEADER_SIZE: usize = 4 + 4 + IV_SIZE;

/// Upper bound on a declared frame length. Anything larger is treated as
/// corruption rather than trusted as an allocation size.
pub const MAX_FRAME_SIZE: usize = 1 << 20;

// =============================================================================
// PACKET LAYOUT
// =============================================================================

/// Decrypted packet header size: kind (1) + utc_timestamp (8, LE64).
pub const PACKET_HEADER_SIZE: usize = 1 + 8;

/// Heartbeat nonce size (a 128-bit UUID).
pub const NONCE_SIZE: usize = 16;

/// Connection identity size on the wire (a 128-bit UUID).
pub const IDENTITY_SIZE: usize = 16;

// =============================================================================
// CRYPTOGRAPHIC CONSTANTS
// =============================================================================

/// X25519 public key size.
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Derived AES-256 session key size.
pub const SESSION_KEY_SIZE: usize = 32;

/// AES-GCM authentication tag size.
pub const AEAD_TAG_SIZE: usize = 16;

/// Unencrypted bootstrap message size: public key (32) + IV (16).
pub const KEY_EXCHANGE_SIZE: usize = PUBLIC_KEY_SIZE + IV_SIZE;

// =============================================================================
// TIMING AND RETRY DEFAULTS
// =============================================================================

/// Default heartbeat sweep interval.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// Default handshake timeout while waiting for the peer's key exchange.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default maximum dial attempts.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Default delay between dial attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Default bound for per-connection and registry event channels.
pub const DEFAULT_EVENT_BUFFER: usize = 256;

/// Read buffer size for connection read loops.
pub const READ_BUFFER_SIZE: usize = 8 * 1024;

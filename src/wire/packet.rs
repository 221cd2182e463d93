//! Packet layout: the decrypted logical message.
//!
//! Wire format (inside the encrypted frame payload):
//! ```text
//! +--------+--------------------+------------------+
//! | Kind   | UTC Timestamp      | Payload          |
//! | 1 byte | 8 bytes (LE64, ms) | variable         |
//! +--------+--------------------+------------------+
//! ```

use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use uuid::Uuid;

use crate::core::{IDENTITY_SIZE, NONCE_SIZE, PACKET_HEADER_SIZE, WireError};

/// Packet kind identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketKind {
    /// Free-form text message.
    Text = 0x01,
    /// Text message addressed to a channel (channel UUID + text).
    ChannelMessage = 0x02,
    /// Text message addressed to a single peer (peer UUID + text).
    PrivateMessage = 0x03,
    /// Heartbeat probe carrying a 16-byte nonce.
    Ping = 0x04,
    /// Heartbeat answer echoing the probe's nonce.
    Pong = 0x05,
    /// Request to open a relayed connection to a serialized endpoint.
    Connect = 0x06,
    /// Answer to Connect carrying the new upstream connection's identity.
    Connected = 0x07,
    /// Graceful disconnect notice.
    Disconnect = 0x08,
    /// Friendly name announcement.
    Identity = 0x09,
    /// Channel announcement (channel UUID + name).
    ChannelIdentity = 0x0A,
    /// Opens a batch of identity packets.
    BeginIdentity = 0x0B,
    /// Closes a batch of identity packets.
    EndIdentity = 0x0C,
    /// In-band key exchange carrier.
    EncryptionKeys = 0x0D,
    /// A peer joined the overlay.
    PeerJoined = 0x0E,
    /// A peer left the overlay.
    PeerLeft = 0x0F,
}

impl PacketKind {
    /// Parse a packet kind from a byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::Text),
            0x02 => Some(Self::ChannelMessage),
            0x03 => Some(Self::PrivateMessage),
            0x04 => Some(Self::Ping),
            0x05 => Some(Self::Pong),
            0x06 => Some(Self::Connect),
            0x07 => Some(Self::Connected),
            0x08 => Some(Self::Disconnect),
            0x09 => Some(Self::Identity),
            0x0A => Some(Self::ChannelIdentity),
            0x0B => Some(Self::BeginIdentity),
            0x0C => Some(Self::EndIdentity),
            0x0D => Some(Self::EncryptionKeys),
            0x0E => Some(Self::PeerJoined),
            0x0F => Some(Self::PeerLeft),
            _ => None,
        }
    }

    /// Convert to the wire byte.
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// The decrypted logical message carried by one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Packet kind.
    pub kind: PacketKind,
    /// Sender's UTC timestamp in milliseconds since the Unix epoch.
    pub utc_timestamp: i64,
    /// Kind-specific payload bytes.
    pub payload: Vec<u8>,
}

/// Current UTC time in milliseconds since the Unix epoch.
fn now_utc_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

impl Packet {
    /// Create a packet stamped with the current UTC time.
    pub fn new(kind: PacketKind, payload: Vec<u8>) -> Self {
        Self {
            kind,
            utc_timestamp: now_utc_millis(),
            payload,
        }
    }

    /// A text message.
    pub fn text(message: &str) -> Self {
        Self::new(PacketKind::Text, message.as_bytes().to_vec())
    }

    /// A heartbeat probe carrying `nonce`.
    pub fn ping(nonce: Uuid) -> Self {
        Self::new(PacketKind::Ping, nonce.as_bytes().to_vec())
    }

    /// A heartbeat answer echoing `nonce`.
    pub fn pong(nonce: Uuid) -> Self {
        Self::new(PacketKind::Pong, nonce.as_bytes().to_vec())
    }

    /// A relayed-connection request for `endpoint`.
    pub fn connect(endpoint: SocketAddr) -> Self {
        Self::new(PacketKind::Connect, endpoint.to_string().into_bytes())
    }

    /// The answer to [`Packet::connect`], naming the upstream identity.
    pub fn connected(identity: Uuid) -> Self {
        Self::new(PacketKind::Connected, identity.as_bytes().to_vec())
    }

    /// A graceful disconnect notice.
    pub fn disconnect() -> Self {
        Self::new(PacketKind::Disconnect, Vec::new())
    }

    /// A friendly-name announcement.
    pub fn identity(name: &str) -> Self {
        Self::new(PacketKind::Identity, name.as_bytes().to_vec())
    }

    /// A channel announcement.
    pub fn channel_identity(channel: Uuid, name: &str) -> Self {
        let mut payload = Vec::with_capacity(IDENTITY_SIZE + name.len());
        payload.extend_from_slice(channel.as_bytes());
        payload.extend_from_slice(name.as_bytes());
        Self::new(PacketKind::ChannelIdentity, payload)
    }

    /// A message addressed to a channel.
    pub fn channel_message(channel: Uuid, message: &str) -> Self {
        let mut payload = Vec::with_capacity(IDENTITY_SIZE + message.len());
        payload.extend_from_slice(channel.as_bytes());
        payload.extend_from_slice(message.as_bytes());
        Self::new(PacketKind::ChannelMessage, payload)
    }

    /// Opens an identity batch.
    pub fn begin_identity() -> Self {
        Self::new(PacketKind::BeginIdentity, Vec::new())
    }

    /// Closes an identity batch.
    pub fn end_identity() -> Self {
        Self::new(PacketKind::EndIdentity, Vec::new())
    }

    /// Serialize to plaintext bytes (ready for encryption).
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(PACKET_HEADER_SIZE + self.payload.len());
        buf.push(self.kind.as_byte());
        buf.extend_from_slice(&self.utc_timestamp.to_le_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Parse a packet from decrypted bytes.
    ///
    /// Total: never panics on any byte pattern. Unknown kinds and short
    /// buffers surface as [`WireError`].
    pub fn decode(data: &[u8]) -> Result<Self, WireError> {
        if data.len() < PACKET_HEADER_SIZE {
            return Err(WireError::TruncatedPacket(data.len()));
        }

        let kind = PacketKind::from_byte(data[0]).ok_or(WireError::UnknownPacketKind(data[0]))?;

        let mut ts = [0u8; 8];
        ts.copy_from_slice(&data[1..9]);
        let utc_timestamp = i64::from_le_bytes(ts);

        Ok(Self {
            kind,
            utc_timestamp,
            payload: data[PACKET_HEADER_SIZE..].to_vec(),
        })
    }

    /// Extract the heartbeat nonce from a Ping or Pong payload.
    pub fn nonce(&self) -> Result<Uuid, WireError> {
        let bytes: [u8; NONCE_SIZE] = self
            .payload
            .as_slice()
            .try_into()
            .map_err(|_| WireError::InvalidPayload("nonce"))?;
        Ok(Uuid::from_bytes(bytes))
    }

    /// Extract the serialized endpoint from a Connect payload.
    pub fn endpoint(&self) -> Result<SocketAddr, WireError> {
        std::str::from_utf8(&self.payload)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(WireError::InvalidPayload("endpoint"))
    }

    /// Extract the peer identity from a Connected payload.
    pub fn peer_identity(&self) -> Result<Uuid, WireError> {
        let bytes: [u8; IDENTITY_SIZE] = self
            .payload
            .as_slice()
            .try_into()
            .map_err(|_| WireError::InvalidPayload("identity"))?;
        Ok(Uuid::from_bytes(bytes))
    }

    /// Extract the UTF-8 text from a Text or Identity payload.
    pub fn utf8_payload(&self) -> Result<&str, WireError> {
        std::str::from_utf8(&self.payload).map_err(|_| WireError::InvalidPayload("utf-8"))
    }

    /// Extract `(uuid, text)` from a ChannelIdentity, ChannelMessage, or
    /// PrivateMessage payload.
    pub fn uuid_and_text(&self) -> Result<(Uuid, &str), WireError> {
        if self.payload.len() < IDENTITY_SIZE {
            return Err(WireError::InvalidPayload("uuid+text"));
        }
        let (id, text) = self.payload.split_at(IDENTITY_SIZE);
        let id = Uuid::from_slice(id).map_err(|_| WireError::InvalidPayload("uuid+text"))?;
        let text = std::str::from_utf8(text).map_err(|_| WireError::InvalidPayload("uuid+text"))?;
        Ok((id, text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_roundtrip() {
        for byte in 0x01..=0x0F {
            let kind = PacketKind::from_byte(byte).unwrap();
            assert_eq!(kind.as_byte(), byte);
        }
        assert_eq!(PacketKind::from_byte(0x00), None);
        assert_eq!(PacketKind::from_byte(0x10), None);
        assert_eq!(PacketKind::from_byte(0xFF), None);
    }

    #[test]
    fn test_packet_roundtrip() {
        let packet = Packet {
            kind: PacketKind::Ping,
            utc_timestamp: 0x0123_4567_89AB_CDEF,
            payload: vec![0u8; 16],
        };

        let decoded = Packet::decode(&packet.encode()).unwrap();
        assert_eq!(decoded.kind, packet.kind);
        assert_eq!(decoded.utc_timestamp, packet.utc_timestamp);
        assert_eq!(decoded.payload, packet.payload);
    }

    #[test]
    fn test_packet_roundtrip_all_kinds() {
        let nonce = Uuid::new_v4();
        let channel = Uuid::new_v4();
        let packets = vec![
            Packet::text("hello"),
            Packet::channel_message(channel, "hi all"),
            Packet::ping(nonce),
            Packet::pong(nonce),
            Packet::connect("127.0.0.1:9000".parse().unwrap()),
            Packet::connected(channel),
            Packet::disconnect(),
            Packet::identity("alice"),
            Packet::channel_identity(channel, "general"),
            Packet::begin_identity(),
            Packet::end_identity(),
        ];

        for packet in packets {
            assert_eq!(Packet::decode(&packet.encode()).unwrap(), packet);
        }
    }

    #[test]
    fn test_negative_timestamp_roundtrip() {
        let packet = Packet {
            kind: PacketKind::Text,
            utc_timestamp: -1,
            payload: Vec::new(),
        };
        assert_eq!(Packet::decode(&packet.encode()).unwrap(), packet);
    }

    #[test]
    fn test_decode_unknown_kind() {
        let mut data = Packet::text("x").encode();
        data[0] = 0x7F;
        assert!(matches!(
            Packet::decode(&data),
            Err(WireError::UnknownPacketKind(0x7F))
        ));
    }

    #[test]
    fn test_decode_truncated() {
        for len in 0..PACKET_HEADER_SIZE {
            assert!(matches!(
                Packet::decode(&vec![0x01; len]),
                Err(WireError::TruncatedPacket(_))
            ));
        }
    }

    #[test]
    fn test_nonce_payload() {
        let nonce = Uuid::new_v4();
        assert_eq!(Packet::ping(nonce).nonce().unwrap(), nonce);

        let bad = Packet::new(PacketKind::Ping, vec![0u8; 5]);
        assert!(bad.nonce().is_err());
    }

    #[test]
    fn test_endpoint_payload() {
        let addr: SocketAddr = "10.1.2.3:4567".parse().unwrap();
        assert_eq!(Packet::connect(addr).endpoint().unwrap(), addr);

        let bad = Packet::new(PacketKind::Connect, b"not an endpoint".to_vec());
        assert!(bad.endpoint().is_err());
    }

    #[test]
    fn test_uuid_and_text_payload() {
        let channel = Uuid::new_v4();
        let packet = Packet::channel_identity(channel, "ops");
        let (id, name) = packet.uuid_and_text().unwrap();
        assert_eq!(id, channel);
        assert_eq!(name, "ops");

        let bad = Packet::new(PacketKind::ChannelIdentity, vec![0u8; 4]);
        assert!(bad.uuid_and_text().is_err());
    }
}

//! Incremental frame reassembly.
//!
//! TCP delivers a byte stream with arbitrary read boundaries; a single
//! `read` may return one byte or several frames. [`FrameReader`] is the
//! state machine that accumulates those reads and emits complete decrypted
//! packets, producing the identical packet sequence for any chunking of the
//! same stream.

use thiserror::Error;

use crate::core::{CryptoError, FRAME_HEADER_SIZE, WireError};
use crate::crypto::EncryptionSession;

use super::frame::{FrameHeader, decode_frame_header};
use super::packet::Packet;

/// Errors from frame reassembly. All of them are fatal for the connection.
#[derive(Debug, Error)]
pub enum ReaderError {
    /// Wire-level corruption (bad marker, bad declared length, bad packet).
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// The frame's ciphertext failed to decrypt or authenticate.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

/// Reassembly state.
#[derive(Debug, Clone, Copy)]
enum ReadState {
    /// Accumulating bytes until a full frame header is available.
    AwaitingHeader,
    /// Header validated; accumulating the declared ciphertext.
    AwaitingContent(FrameHeader),
}

/// State machine turning a chunked byte stream into decrypted packets.
#[derive(Debug)]
pub struct FrameReader {
    buffer: Vec<u8>,
    state: ReadState,
}

impl FrameReader {
    /// Create an empty reader.
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            state: ReadState::AwaitingHeader,
        }
    }

    /// Append freshly read bytes and emit every packet they complete.
    ///
    /// Any error is non-recoverable: the stream position is lost and the
    /// caller must drop the connection.
    pub fn feed(
        &mut self,
        bytes: &[u8],
        session: &EncryptionSession,
    ) -> Result<Vec<Packet>, ReaderError> {
        self.buffer.extend_from_slice(bytes);

        let mut packets = Vec::new();
        loop {
            match self.state {
                ReadState::AwaitingHeader => {
                    match decode_frame_header(&self.buffer)? {
                        Some(header) => {
                            self.buffer.drain(..FRAME_HEADER_SIZE);
                            self.state = ReadState::AwaitingContent(header);
                        }
                        // Need more bytes.
                        None => break,
                    }
                }
                ReadState::AwaitingContent(header) => {
                    let content_length = header.content_length();
                    if self.buffer.len() < content_length {
                        break;
                    }

                    let ciphertext: Vec<u8> = self.buffer.drain(..content_length).collect();
                    let plaintext = session.decrypt(&header.iv, &ciphertext)?;
                    packets.push(Packet::decode(&plaintext)?);
                    self.state = ReadState::AwaitingHeader;
                }
            }
        }

        Ok(packets)
    }

    /// Whether bytes of an incomplete frame are pending.
    ///
    /// Used on EOF to distinguish a clean disconnect from an abrupt one.
    pub fn has_partial_frame(&self) -> bool {
        !self.buffer.is_empty() || matches!(self.state, ReadState::AwaitingContent(_))
    }
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ALIGNMENT_MARKER;
    use crate::wire::frame::encode_frame;
    use crate::wire::packet::PacketKind;

    fn negotiated_pair() -> (EncryptionSession, EncryptionSession) {
        let mut a = EncryptionSession::new();
        let mut b = EncryptionSession::new();
        let (pub_a, iv_a) =
            EncryptionSession::parse_key_exchange_message(&a.build_key_exchange_message()).unwrap();
        let (pub_b, iv_b) =
            EncryptionSession::parse_key_exchange_message(&b.build_key_exchange_message()).unwrap();
        a.accept_remote_keys(pub_b, iv_b).unwrap();
        b.accept_remote_keys(pub_a, iv_a).unwrap();
        (a, b)
    }

    fn encode_packet(session: &EncryptionSession, packet: &Packet) -> Vec<u8> {
        let (iv, ciphertext) = session.encrypt(&packet.encode()).unwrap();
        encode_frame(&iv, &ciphertext)
    }

    #[test]
    fn test_single_frame_one_shot() {
        let (sender, receiver) = negotiated_pair();
        let packet = Packet::text("hello");
        let stream = encode_packet(&sender, &packet);

        let mut reader = FrameReader::new();
        let packets = reader.feed(&stream, &receiver).unwrap();
        assert_eq!(packets, vec![packet]);
        assert!(!reader.has_partial_frame());
    }

    #[test]
    fn test_chunking_invariance() {
        let (sender, receiver) = negotiated_pair();

        // The same stream must decode identically regardless of how the
        // socket slices it.
        for payload_size in [0usize, 1, 7, 100, 1024, 64 * 1024] {
            let packet = Packet::new(PacketKind::Text, vec![0x5A; payload_size]);
            let stream = encode_packet(&sender, &packet);

            let mut one_shot = FrameReader::new();
            let expected = one_shot.feed(&stream, &receiver).unwrap();

            for chunk_size in [1usize, 2, 3, 16, 1000] {
                let mut reader = FrameReader::new();
                let mut got = Vec::new();
                for chunk in stream.chunks(chunk_size) {
                    got.extend(reader.feed(chunk, &receiver).unwrap());
                }
                assert_eq!(got, expected, "chunk_size={chunk_size}");
                assert!(!reader.has_partial_frame());
            }
        }
    }

    #[test]
    fn test_multiple_frames_in_one_read() {
        let (sender, receiver) = negotiated_pair();
        let first = Packet::text("first");
        let second = Packet::text("second");
        let third = Packet::disconnect();

        let mut stream = encode_packet(&sender, &first);
        stream.extend(encode_packet(&sender, &second));
        stream.extend(encode_packet(&sender, &third));

        let mut reader = FrameReader::new();
        let packets = reader.feed(&stream, &receiver).unwrap();
        assert_eq!(packets, vec![first, second, third]);
    }

    #[test]
    fn test_corrupt_marker_never_yields_packet() {
        let (sender, receiver) = negotiated_pair();
        let mut stream = encode_packet(&sender, &Packet::text("x"));
        stream[4..8].copy_from_slice(&(ALIGNMENT_MARKER ^ 1).to_le_bytes());

        let mut reader = FrameReader::new();
        assert!(matches!(
            reader.feed(&stream, &receiver),
            Err(ReaderError::Wire(WireError::BadAlignmentMarker { .. }))
        ));
    }

    #[test]
    fn test_corrupt_marker_mid_stream() {
        let (sender, receiver) = negotiated_pair();
        let good = Packet::text("good");
        let mut stream = encode_packet(&sender, &good);
        let mut bad = encode_packet(&sender, &Packet::text("bad"));
        bad[5] ^= 0xFF;
        stream.extend(bad);

        // The first frame decodes; the second is fatal.
        let mut reader = FrameReader::new();
        let err = reader.feed(&stream, &receiver).unwrap_err();
        assert!(matches!(
            err,
            ReaderError::Wire(WireError::BadAlignmentMarker { .. })
        ));
    }

    #[test]
    fn test_tampered_ciphertext_is_fatal() {
        let (sender, receiver) = negotiated_pair();
        let mut stream = encode_packet(&sender, &Packet::text("payload"));
        let last = stream.len() - 1;
        stream[last] ^= 0xFF;

        let mut reader = FrameReader::new();
        assert!(matches!(
            reader.feed(&stream, &receiver),
            Err(ReaderError::Crypto(CryptoError::DecryptFailed))
        ));
    }

    #[test]
    fn test_partial_frame_detection() {
        let (sender, receiver) = negotiated_pair();
        let stream = encode_packet(&sender, &Packet::text("partial"));

        let mut reader = FrameReader::new();

        // Half a header.
        assert!(reader.feed(&stream[..3], &receiver).unwrap().is_empty());
        assert!(reader.has_partial_frame());

        // Full header, missing content.
        assert!(
            reader
                .feed(&stream[3..FRAME_HEADER_SIZE + 1], &receiver)
                .unwrap()
                .is_empty()
        );
        assert!(reader.has_partial_frame());

        // Rest of the frame.
        let packets = reader
            .feed(&stream[FRAME_HEADER_SIZE + 1..], &receiver)
            .unwrap();
        assert_eq!(packets.len(), 1);
        assert!(!reader.has_partial_frame());
    }

    #[test]
    fn test_empty_payload_frame() {
        let (sender, receiver) = negotiated_pair();
        let packet = Packet::disconnect();
        let stream = encode_packet(&sender, &packet);

        let mut reader = FrameReader::new();
        assert_eq!(reader.feed(&stream, &receiver).unwrap(), vec![packet]);
    }

    #[test]
    fn test_iv_from_header_is_used() {
        let (sender, receiver) = negotiated_pair();
        let mut stream = encode_packet(&sender, &Packet::text("payload"));
        // Flip a bit of the IV inside the header; authentication must fail.
        stream[8] ^= 0x01;

        let mut reader = FrameReader::new();
        assert!(matches!(
            reader.feed(&stream, &receiver),
            Err(ReaderError::Crypto(CryptoError::DecryptFailed))
        ));
    }
}

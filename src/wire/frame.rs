//! Frame envelope encoding and decoding.
//!
//! Wire format:
//! ```text
//! +----------------+------------------+----------------+------------------+
//! | Total Length   | Alignment Marker | IV             | Ciphertext       |
//! | 4 bytes (LE32) | 4 bytes (LE32)   | 16 bytes       | variable         |
//! +----------------+------------------+----------------+------------------+
//! ```
//!
//! `total_length` counts the entire frame, its own four bytes included. The
//! alignment marker is a fixed constant; a mismatch means the stream has
//! desynchronized and the connection is unrecoverable.

use crate::core::{ALIGNMENT_MARKER, FRAME_HEADER_SIZE, IV_SIZE, MAX_FRAME_SIZE, WireError};

/// A decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Declared length of the whole frame, header included.
    pub total_length: u32,
    /// Per-frame initialization vector for the session cipher.
    pub iv: [u8; IV_SIZE],
}

impl FrameHeader {
    /// Length of the ciphertext that follows the header.
    pub fn content_length(&self) -> usize {
        self.total_length as usize - FRAME_HEADER_SIZE
    }
}

/// Encode a complete frame around an already-encrypted payload.
pub fn encode_frame(iv: &[u8; IV_SIZE], ciphertext: &[u8]) -> Vec<u8> {
    let total_length = (FRAME_HEADER_SIZE + ciphertext.len()) as u32;
    let mut buf = Vec::with_capacity(total_length as usize);
    buf.extend_from_slice(&total_length.to_le_bytes());
    buf.extend_from_slice(&ALIGNMENT_MARKER.to_le_bytes());
    buf.extend_from_slice(iv);
    buf.extend_from_slice(ciphertext);
    buf
}

/// Decode a frame header from the front of `buf`.
///
/// Returns `Ok(None)` when fewer than [`FRAME_HEADER_SIZE`] bytes are
/// available: the caller must wait for more data; this is not an error.
/// Returns `Err` on corruption: a wrong alignment marker or a declared
/// length outside `[FRAME_HEADER_SIZE, MAX_FRAME_SIZE]`. Corruption is
/// fatal, not retryable.
pub fn decode_frame_header(buf: &[u8]) -> Result<Option<FrameHeader>, WireError> {
    if buf.len() < FRAME_HEADER_SIZE {
        return Ok(None);
    }

    let total_length = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
    let marker = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);

    if marker != ALIGNMENT_MARKER {
        return Err(WireError::BadAlignmentMarker {
            expected: ALIGNMENT_MARKER,
            found: marker,
        });
    }

    // The length field is attacker-controlled; bound it before anyone
    // allocates or waits on it.
    if (total_length as usize) < FRAME_HEADER_SIZE {
        return Err(WireError::FrameTooShort(total_length));
    }
    if total_length as usize > MAX_FRAME_SIZE {
        return Err(WireError::FrameTooLarge(total_length));
    }

    let mut iv = [0u8; IV_SIZE];
    iv.copy_from_slice(&buf[8..8 + IV_SIZE]);

    Ok(Some(FrameHeader { total_length, iv }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_frame_layout() {
        let iv = [0xAA; IV_SIZE];
        let ciphertext = [0x01, 0x02, 0x03];
        let frame = encode_frame(&iv, &ciphertext);

        assert_eq!(frame.len(), FRAME_HEADER_SIZE + 3);
        assert_eq!(
            u32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]),
            (FRAME_HEADER_SIZE + 3) as u32
        );
        assert_eq!(
            u32::from_le_bytes([frame[4], frame[5], frame[6], frame[7]]),
            ALIGNMENT_MARKER
        );
        assert_eq!(&frame[8..24], &iv);
        assert_eq!(&frame[24..], &ciphertext);
    }

    #[test]
    fn test_header_layout_is_stable() {
        let frame = encode_frame(&[0u8; IV_SIZE], &[]);
        // total_length = 24 (LE), then the marker (LE), then the IV.
        assert_eq!(hex::encode(&frame[..8]), "180000003130574d");
        assert_eq!(frame.len(), FRAME_HEADER_SIZE);
    }

    #[test]
    fn test_decode_header_roundtrip() {
        let iv = [0x42; IV_SIZE];
        let frame = encode_frame(&iv, &[0u8; 100]);

        let header = decode_frame_header(&frame).unwrap().unwrap();
        assert_eq!(header.total_length as usize, FRAME_HEADER_SIZE + 100);
        assert_eq!(header.iv, iv);
        assert_eq!(header.content_length(), 100);
    }

    #[test]
    fn test_decode_needs_more_bytes() {
        let frame = encode_frame(&[0u8; IV_SIZE], &[1, 2, 3]);
        for len in 0..FRAME_HEADER_SIZE {
            assert_eq!(decode_frame_header(&frame[..len]).unwrap(), None);
        }
    }

    #[test]
    fn test_decode_bad_marker_is_fatal() {
        let mut frame = encode_frame(&[0u8; IV_SIZE], &[1, 2, 3]);
        frame[5] ^= 0xFF;

        assert!(matches!(
            decode_frame_header(&frame),
            Err(WireError::BadAlignmentMarker { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_undersized_length() {
        let mut frame = encode_frame(&[0u8; IV_SIZE], &[]);
        frame[0..4].copy_from_slice(&((FRAME_HEADER_SIZE - 1) as u32).to_le_bytes());

        assert!(matches!(
            decode_frame_header(&frame),
            Err(WireError::FrameTooShort(_))
        ));
    }

    #[test]
    fn test_decode_rejects_oversized_length() {
        let mut frame = encode_frame(&[0u8; IV_SIZE], &[]);
        frame[0..4].copy_from_slice(&((MAX_FRAME_SIZE + 1) as u32).to_le_bytes());

        assert!(matches!(
            decode_frame_header(&frame),
            Err(WireError::FrameTooLarge(_))
        ));
    }
}

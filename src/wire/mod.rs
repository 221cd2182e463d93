//! Wire codec: frame envelope, packet layout, and stream reassembly.
//!
//! - **Frame encoding/decoding**: [`encode_frame`], [`decode_frame_header`]
//! - **Packet codec**: [`Packet`], [`PacketKind`], payload helpers
//! - **Stream reassembly**: [`FrameReader`], an incremental state machine that
//!   turns arbitrarily chunked socket reads into discrete decrypted packets
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        Transport (connections)          │
//! ├─────────────────────────────────────────┤
//! │            Wire codec                   │  ← This module
//! │   frames, packets, reassembly           │
//! ├─────────────────────────────────────────┤
//! │         Crypto (session AEAD)           │
//! ├─────────────────────────────────────────┤
//! │              TCP                        │
//! └─────────────────────────────────────────┘
//! ```

mod frame;
mod packet;
mod reader;

pub use frame::{FrameHeader, decode_frame_header, encode_frame};
pub use packet::{Packet, PacketKind};
pub use reader::{FrameReader, ReaderError};

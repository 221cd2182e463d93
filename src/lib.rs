//! # meshwire
//!
//! An encrypted, length-framed TCP messaging protocol connecting peer roles
//! (client, server, relay/"bouncer") into a small overlay network.
//!
//! meshwire provides:
//!
//! - **Framing**: length-prefixed frames with an alignment marker, reassembled
//!   correctly from arbitrary TCP read chunking
//! - **Security**: an X25519 key exchange per connection and an AES-256-GCM
//!   session cipher with per-message IVs
//! - **Liveness**: a ping/pong heartbeat that forcibly disconnects peers that
//!   stop answering
//! - **Relaying**: a coordinator that bridges a downstream connection pool to
//!   upstream peers it dials on request
//!
//! ## Modules
//!
//! - [`core`]: protocol constants and error types
//! - [`wire`]: frame and packet codecs plus the incremental [`wire::FrameReader`]
//! - [`crypto`]: key exchange and the per-connection [`crypto::EncryptionSession`]
//! - [`transport`]: connections, the identity-keyed registry, and the heartbeat monitor
//! - [`server`]: the accepting role
//! - [`client`]: the dialing role
//! - [`relay`]: the bouncer role bridging two registries
//!
//! ## Example
//!
//! ```no_run
//! use meshwire::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), MeshwireError> {
//!     let config = NodeConfig::builder()
//!         .bind_addr("127.0.0.1:7400".parse().unwrap())
//!         .build();
//!
//!     let (server, mut events) = MeshServer::bind(config).await?;
//!
//!     while let Some(event) = events.recv().await {
//!         match event {
//!             RegistryEvent::Connected { identity } => {
//!                 println!("peer {identity} connected");
//!             }
//!             RegistryEvent::PacketReceived { identity, packet } => {
//!                 println!("{identity}: {:?}", packet.kind);
//!             }
//!             RegistryEvent::Disconnected { identity, .. } => {
//!                 println!("peer {identity} gone");
//!             }
//!         }
//!     }
//!     server.shutdown().await;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod config;
pub mod core;
pub mod crypto;
pub mod relay;
pub mod server;
pub mod transport;
pub mod wire;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::client::dial;
    pub use crate::config::{NodeConfig, NodeConfigBuilder, RetryPolicy};
    pub use crate::core::{
        ConnectionError, CryptoError, MeshwireError, RelayError, ServerError, WireError,
    };
    pub use crate::crypto::EncryptionSession;
    pub use crate::relay::{RelayCoordinator, RelayEvent};
    pub use crate::server::MeshServer;
    pub use crate::transport::{
        Connection, ConnectionEvent, ConnectionRegistry, ConnectionState, DisconnectKind,
        HeartbeatMonitor, RegistryEvent,
    };
    pub use crate::wire::{FrameReader, Packet, PacketKind};
}

pub use config::NodeConfig;
pub use core::MeshwireError;
pub use server::MeshServer;
pub use transport::{Connection, ConnectionRegistry, RegistryEvent};
pub use wire::{Packet, PacketKind};

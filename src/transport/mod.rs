//! Transport layer: connections, the identity-keyed registry, and the
//! heartbeat monitor.
//!
//! - **Connection lifecycle**: [`Connection`] with the
//!   `Connecting → Handshaking → Ready → Closed` state machine
//! - **Registry**: [`ConnectionRegistry`], the exclusive identity→connection
//!   map with event dispatch
//! - **Liveness**: [`HeartbeatMonitor`], the periodic ping sweep

mod connection;
mod heartbeat;
mod registry;

pub use connection::{
    Connection, ConnectionEvent, ConnectionState, DisconnectKind, PendingPing, PongOutcome,
};
pub use heartbeat::HeartbeatMonitor;
pub use registry::{ConnectionRegistry, RegistryEvent};

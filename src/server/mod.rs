//! The accepting server role.

mod server;

pub use server::MeshServer;

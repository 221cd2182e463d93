//! Crypto layer: X25519 key exchange and the per-connection session cipher.

mod keys;
mod session;

pub use keys::SessionKeypair;
pub use session::{EncryptionSession, SessionKey};

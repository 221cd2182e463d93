//! X25519 key management.

use rand::rngs::OsRng;
use x25519_dalek::{PublicKey, SharedSecret, StaticSecret};

use crate::core::PUBLIC_KEY_SIZE;

/// An X25519 keypair generated once per connection.
///
/// The private half is zeroized on drop by `x25519-dalek`.
pub struct SessionKeypair {
    secret: StaticSecret,
    public: PublicKey,
}

impl SessionKeypair {
    /// Generate a fresh random keypair.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// The public key to send in the key exchange message.
    pub fn public_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.public.to_bytes()
    }

    /// Compute the Diffie-Hellman shared secret with the remote public key.
    pub fn diffie_hellman(&self, remote_public: &[u8; PUBLIC_KEY_SIZE]) -> SharedSecret {
        self.secret.diffie_hellman(&PublicKey::from(*remote_public))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypair_generation_is_random() {
        let a = SessionKeypair::generate();
        let b = SessionKeypair::generate();
        assert_ne!(a.public_bytes(), b.public_bytes());
    }

    #[test]
    fn test_shared_secret_agreement() {
        let a = SessionKeypair::generate();
        let b = SessionKeypair::generate();

        let ab = a.diffie_hellman(&b.public_bytes());
        let ba = b.diffie_hellman(&a.public_bytes());
        assert_eq!(ab.as_bytes(), ba.as_bytes());
    }
}

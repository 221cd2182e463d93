//! Per-connection encryption session.
//!
//! Each connection constructs an [`EncryptionSession`] with a fresh X25519
//! keypair, exchanges the unencrypted bootstrap message (public key + IV),
//! and derives an AES-256-GCM session key from the shared secret via
//! HKDF-SHA256. The key exchange happens exactly once; every frame after it
//! carries a fresh random 16-byte IV used as the AEAD nonce.

use aes_gcm::{
    AesGcm, Nonce,
    aead::{Aead, KeyInit, generic_array::typenum::U16},
    aes::Aes256,
};
use hkdf::Hkdf;
use rand::{RngCore, rngs::OsRng};
use sha2::Sha256;
use zeroize::Zeroize;

use crate::core::{CryptoError, IV_SIZE, KEY_EXCHANGE_SIZE, PUBLIC_KEY_SIZE, SESSION_KEY_SIZE};

use super::keys::SessionKeypair;

/// AES-256-GCM instantiated with the protocol's 16-byte IV as the nonce.
type SessionCipher = AesGcm<Aes256, U16>;

/// HKDF info label for session key derivation.
const SESSION_KEY_INFO: &[u8] = b"meshwire v1 session key";

/// A derived symmetric session key.
///
/// Zeroized on drop.
#[derive(Clone)]
pub struct SessionKey {
    key: [u8; SESSION_KEY_SIZE],
}

impl SessionKey {
    /// Create a session key from raw bytes.
    pub fn from_bytes(key: [u8; SESSION_KEY_SIZE]) -> Self {
        Self { key }
    }

    /// Get the raw key bytes.
    ///
    /// # Security
    /// Handle with care - this exposes sensitive key material.
    pub fn as_bytes(&self) -> &[u8; SESSION_KEY_SIZE] {
        &self.key
    }
}

impl Drop for SessionKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

/// Per-connection key exchange state and symmetric cipher.
pub struct EncryptionSession {
    keypair: SessionKeypair,
    local_iv: [u8; IV_SIZE],
    remote_iv: Option<[u8; IV_SIZE]>,
    session_key: Option<SessionKey>,
}

impl EncryptionSession {
    /// Create a session with a freshly generated keypair and bootstrap IV.
    pub fn new() -> Self {
        let mut local_iv = [0u8; IV_SIZE];
        OsRng.fill_bytes(&mut local_iv);
        Self {
            keypair: SessionKeypair::generate(),
            local_iv,
            remote_iv: None,
            session_key: None,
        }
    }

    /// Whether the key exchange has completed.
    pub fn negotiated(&self) -> bool {
        self.session_key.is_some()
    }

    /// The IV the peer announced during the key exchange, once negotiated.
    ///
    /// Carried for wire compatibility; data frames use per-message IVs.
    pub fn remote_iv(&self) -> Option<[u8; IV_SIZE]> {
        self.remote_iv
    }

    /// Build the unencrypted bootstrap message: `public_key[32] | iv[16]`.
    ///
    /// Sent by both peers immediately after socket establishment; this is
    /// the only unencrypted traffic on a connection.
    pub fn build_key_exchange_message(&self) -> [u8; KEY_EXCHANGE_SIZE] {
        let mut msg = [0u8; KEY_EXCHANGE_SIZE];
        msg[..PUBLIC_KEY_SIZE].copy_from_slice(&self.keypair.public_bytes());
        msg[PUBLIC_KEY_SIZE..].copy_from_slice(&self.local_iv);
        msg
    }

    /// Parse a peer's bootstrap message into `(public_key, iv)`.
    pub fn parse_key_exchange_message(
        buf: &[u8],
    ) -> Result<([u8; PUBLIC_KEY_SIZE], [u8; IV_SIZE]), CryptoError> {
        if buf.len() != KEY_EXCHANGE_SIZE {
            return Err(CryptoError::MalformedKeyExchange);
        }
        let mut public = [0u8; PUBLIC_KEY_SIZE];
        let mut iv = [0u8; IV_SIZE];
        public.copy_from_slice(&buf[..PUBLIC_KEY_SIZE]);
        iv.copy_from_slice(&buf[PUBLIC_KEY_SIZE..]);
        Ok((public, iv))
    }

    /// Complete the key exchange with the peer's public key and IV.
    ///
    /// Computes the X25519 shared secret and derives the session key.
    /// Calling this a second time on the same session is a protocol
    /// violation and fails with [`CryptoError::AlreadyNegotiated`].
    pub fn accept_remote_keys(
        &mut self,
        remote_public: [u8; PUBLIC_KEY_SIZE],
        remote_iv: [u8; IV_SIZE],
    ) -> Result<(), CryptoError> {
        if self.negotiated() {
            return Err(CryptoError::AlreadyNegotiated);
        }

        let shared = self.keypair.diffie_hellman(&remote_public);
        // A non-contributory peer key (low-order point) yields an all-zero
        // secret; reject it rather than keying the cipher with it.
        if !shared.was_contributory() {
            return Err(CryptoError::MalformedKeyExchange);
        }

        let hk = Hkdf::<Sha256>::new(None, shared.as_bytes());
        let mut key = [0u8; SESSION_KEY_SIZE];
        hk.expand(SESSION_KEY_INFO, &mut key)
            .map_err(|_| CryptoError::MalformedKeyExchange)?;

        self.session_key = Some(SessionKey::from_bytes(key));
        self.remote_iv = Some(remote_iv);
        key.zeroize();
        Ok(())
    }

    /// Encrypt a plaintext payload under a fresh random IV.
    ///
    /// Returns `(iv, ciphertext)`; the IV goes into the frame header.
    /// Fails with [`CryptoError::NotNegotiated`] before the key exchange.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<([u8; IV_SIZE], Vec<u8>), CryptoError> {
        let key = self.session_key.as_ref().ok_or(CryptoError::NotNegotiated)?;

        let mut iv = [0u8; IV_SIZE];
        OsRng.fill_bytes(&mut iv);

        let cipher = SessionCipher::new(key.as_bytes().into());
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&iv), plaintext)
            .map_err(|_| CryptoError::EncryptFailed)?;

        Ok((iv, ciphertext))
    }

    /// Decrypt a frame's ciphertext under the IV from its header.
    ///
    /// Fails with [`CryptoError::NotNegotiated`] before the key exchange and
    /// [`CryptoError::DecryptFailed`] on authentication failure.
    pub fn decrypt(&self, iv: &[u8; IV_SIZE], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let key = self.session_key.as_ref().ok_or(CryptoError::NotNegotiated)?;

        let cipher = SessionCipher::new(key.as_bytes().into());
        cipher
            .decrypt(Nonce::from_slice(iv), ciphertext)
            .map_err(|_| CryptoError::DecryptFailed)
    }
}

impl Default for EncryptionSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two sessions that have completed the key exchange with each other.
    pub(crate) fn negotiated_pair() -> (EncryptionSession, EncryptionSession) {
        let mut a = EncryptionSession::new();
        let mut b = EncryptionSession::new();

        let msg_a = a.build_key_exchange_message();
        let msg_b = b.build_key_exchange_message();

        let (pub_b, iv_b) = EncryptionSession::parse_key_exchange_message(&msg_b).unwrap();
        let (pub_a, iv_a) = EncryptionSession::parse_key_exchange_message(&msg_a).unwrap();

        a.accept_remote_keys(pub_b, iv_b).unwrap();
        b.accept_remote_keys(pub_a, iv_a).unwrap();

        (a, b)
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let (a, b) = negotiated_pair();

        let plaintext = b"hello overlay";
        let (iv, ciphertext) = a.encrypt(plaintext).unwrap();
        assert_ne!(&ciphertext, plaintext);

        let decrypted = b.decrypt(&iv, &ciphertext).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_ivs_are_fresh_per_message() {
        let (a, _) = negotiated_pair();

        let (iv1, _) = a.encrypt(b"one").unwrap();
        let (iv2, _) = a.encrypt(b"two").unwrap();
        assert_ne!(iv1, iv2);
    }

    #[test]
    fn test_encrypt_before_negotiation_fails() {
        let session = EncryptionSession::new();
        assert!(matches!(
            session.encrypt(b"early"),
            Err(CryptoError::NotNegotiated)
        ));
        assert!(matches!(
            session.decrypt(&[0u8; IV_SIZE], b"early"),
            Err(CryptoError::NotNegotiated)
        ));
    }

    #[test]
    fn test_second_key_exchange_fails() {
        let (mut a, b) = negotiated_pair();

        let (pub_b, iv_b) =
            EncryptionSession::parse_key_exchange_message(&b.build_key_exchange_message()).unwrap();
        assert!(matches!(
            a.accept_remote_keys(pub_b, iv_b),
            Err(CryptoError::AlreadyNegotiated)
        ));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let (a, b) = negotiated_pair();

        let (iv, mut ciphertext) = a.encrypt(b"payload").unwrap();
        ciphertext[0] ^= 0xFF;
        assert!(matches!(
            b.decrypt(&iv, &ciphertext),
            Err(CryptoError::DecryptFailed)
        ));
    }

    #[test]
    fn test_wrong_iv_fails() {
        let (a, b) = negotiated_pair();

        let (_, ciphertext) = a.encrypt(b"payload").unwrap();
        assert!(matches!(
            b.decrypt(&[0u8; IV_SIZE], &ciphertext),
            Err(CryptoError::DecryptFailed)
        ));
    }

    #[test]
    fn test_unrelated_session_cannot_decrypt() {
        let (a, _) = negotiated_pair();
        let (_, other) = negotiated_pair();

        let (iv, ciphertext) = a.encrypt(b"private").unwrap();
        assert!(other.decrypt(&iv, &ciphertext).is_err());
    }

    #[test]
    fn test_malformed_key_exchange_rejected() {
        assert!(matches!(
            EncryptionSession::parse_key_exchange_message(&[0u8; 10]),
            Err(CryptoError::MalformedKeyExchange)
        ));

        // All-zero public key is a low-order point.
        let mut session = EncryptionSession::new();
        assert!(matches!(
            session.accept_remote_keys([0u8; PUBLIC_KEY_SIZE], [0u8; IV_SIZE]),
            Err(CryptoError::MalformedKeyExchange)
        ));
    }
}

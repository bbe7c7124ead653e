//! Symmetric primitives for conversation traffic.
//!
//! ChaCha20-Poly1305 authenticated encryption and a Blake3 keyed MAC, both
//! under a per-conversation [`ConversationKey`].

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use parley_core::MacTag;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CodecError, Result};

/// A 256-bit symmetric key shared by every participant of a conversation.
#[derive(Clone, PartialEq, Eq)]
pub struct ConversationKey([u8; 32]);

impl ConversationKey {
    /// Generate a new random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Encrypt data with this key.
    pub fn encrypt(&self, plaintext: &[u8], nonce: &EncryptionNonce) -> Result<Vec<u8>> {
        let cipher = ChaCha20Poly1305::new_from_slice(&self.0)
            .map_err(|e| CodecError::EncryptionError(e.to_string()))?;

        let nonce = Nonce::from_slice(&nonce.0);
        cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| CodecError::EncryptionError(e.to_string()))
    }

    /// Decrypt data with this key.
    pub fn decrypt(&self, ciphertext: &[u8], nonce: &EncryptionNonce) -> Result<Vec<u8>> {
        let cipher =
            ChaCha20Poly1305::new_from_slice(&self.0).map_err(|_| CodecError::DecryptionFailed)?;

        let nonce = Nonce::from_slice(&nonce.0);
        cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| CodecError::DecryptionFailed)
    }

    /// Blake3 keyed hash of `data`.
    pub fn mac(&self, data: &[u8]) -> MacTag {
        MacTag::from_bytes(*blake3::keyed_hash(&self.0, data).as_bytes())
    }
}

impl fmt::Debug for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ConversationKey(..)")
    }
}

/// A 96-bit nonce for ChaCha20-Poly1305.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionNonce(pub [u8; 12]);

impl EncryptionNonce {
    /// Generate a new random nonce.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 12] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt() {
        let key = ConversationKey::generate();
        let nonce = EncryptionNonce::generate();
        let plaintext = b"hello, world!";

        let ciphertext = key.encrypt(plaintext, &nonce).unwrap();
        assert_ne!(ciphertext, plaintext);

        let decrypted = key.decrypt(&ciphertext, &nonce).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_decrypt_wrong_key_fails() {
        let key1 = ConversationKey::generate();
        let key2 = ConversationKey::generate();
        let nonce = EncryptionNonce::generate();

        let ciphertext = key1.encrypt(b"secret", &nonce).unwrap();

        assert!(matches!(
            key2.decrypt(&ciphertext, &nonce),
            Err(CodecError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_mac_depends_on_key() {
        let key1 = ConversationKey::from_bytes([1; 32]);
        let key2 = ConversationKey::from_bytes([2; 32]);

        assert_eq!(key1.mac(b"data"), key1.mac(b"data"));
        assert_ne!(key1.mac(b"data"), key2.mac(b"data"));
        assert_ne!(key1.mac(b"data"), key1.mac(b"datA"));
    }

    #[test]
    fn test_debug_redacts_key() {
        let key = ConversationKey::from_bytes([0xab; 32]);
        assert_eq!(format!("{:?}", key), "ConversationKey(..)");
    }
}

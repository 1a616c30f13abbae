//! Authenticated symmetric encryption (ChaCha20-Poly1305).

use crate::error::{CryptoError, CryptoResult};
use crate::key::WrappingKey;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// ChaCha20-Poly1305 nonce size in bytes.
pub const NONCE_SIZE: usize = 12;

/// Poly1305 authentication tag size in bytes (appended to the ciphertext).
pub const TAG_SIZE: usize = 16;

/// Ciphertext plus the random nonce it was produced under.
///
/// The Poly1305 tag is carried at the end of `ciphertext`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EncryptedData {
    pub nonce: [u8; NONCE_SIZE],
    pub ciphertext: Vec<u8>,
}

/// Encrypts `plaintext` under `key` with a fresh random nonce.
pub fn encrypt(key: &WrappingKey, plaintext: &[u8]) -> CryptoResult<EncryptedData> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    Ok(EncryptedData {
        nonce: nonce_bytes,
        ciphertext,
    })
}

/// Decrypts and authenticates `data` under `key`.
///
/// A wrong key and a tampered ciphertext are indistinguishable: both fail
/// the tag check and both return [`CryptoError::Decryption`].
pub fn decrypt(key: &WrappingKey, data: &EncryptedData) -> CryptoResult<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));

    cipher
        .decrypt(Nonce::from_slice(&data.nonce), data.ciphertext.as_ref())
        .map_err(|_| CryptoError::Decryption)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> WrappingKey {
        WrappingKey::from_bytes([byte; 32])
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let k = key(7);
        let enc = encrypt(&k, b"secret payload").unwrap();
        assert_eq!(decrypt(&k, &enc).unwrap(), b"secret payload");
    }

    #[test]
    fn wrong_key_fails() {
        let enc = encrypt(&key(1), b"secret payload").unwrap();
        assert!(matches!(
            decrypt(&key(2), &enc),
            Err(CryptoError::Decryption)
        ));
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let k = key(3);
        let mut enc = encrypt(&k, b"secret payload").unwrap();
        enc.ciphertext[0] ^= 0xFF;
        assert!(matches!(decrypt(&k, &enc), Err(CryptoError::Decryption)));
    }

    #[test]
    fn nonces_are_fresh_per_encryption() {
        let k = key(4);
        let a = encrypt(&k, b"same plaintext").unwrap();
        let b = encrypt(&k, b"same plaintext").unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }
}

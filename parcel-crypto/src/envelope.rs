//! Envelope encryption for project key distribution.
//!
//! Uses X25519 key exchange + XSalsa20-Poly1305 to seal a project key for a
//! recipient. Each seal operation uses a fresh ephemeral keypair, so the
//! sealed copy reveals nothing about the sender and two envelopes for the
//! same key are unlinkable.

use crate::error::{CryptoError, CryptoResult};
use crypto_box::aead::Aead;
use crypto_box::{PublicKey, SalsaBox, SecretKey};
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// X25519 identity keypair.
///
/// The secret key implements `ZeroizeOnDrop` (from crypto_box).
pub struct IdentityKeyPair {
    pub secret: SecretKey,
    pub public: PublicKey,
}

impl IdentityKeyPair {
    /// Returns the public key as a raw 32-byte array.
    pub fn public_bytes(&self) -> [u8; 32] {
        *self.public.as_bytes()
    }

    /// Reconstructs a keypair from raw secret key bytes.
    pub fn from_secret(secret: SecretKey) -> Self {
        let public = secret.public_key();
        Self { secret, public }
    }
}

/// A symmetric key sealed with a recipient's X25519 public key.
///
/// The ephemeral public key is included so the recipient can reconstruct
/// the shared secret; only the matching private key can open it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SealedKey {
    /// Ephemeral X25519 public key (sender side of DH).
    pub ephemeral_public_key: [u8; 32],
    /// XSalsa20 nonce (24 bytes).
    pub nonce: [u8; 24],
    /// XSalsa20-Poly1305 ciphertext + tag.
    pub ciphertext: Vec<u8>,
}

/// Generates a fresh X25519 identity keypair.
pub fn generate_identity_keypair() -> IdentityKeyPair {
    let secret = SecretKey::generate(&mut rand::rngs::OsRng);
    let public = secret.public_key();
    IdentityKeyPair { secret, public }
}

/// Seals `key_bytes` for a recipient using anonymous envelope encryption.
///
/// A fresh ephemeral X25519 keypair is generated per seal, so repeated
/// seals of the same key produce independent ciphertexts.
pub fn seal_key(key_bytes: &[u8], recipient_pk: &PublicKey) -> CryptoResult<SealedKey> {
    let ephemeral = SecretKey::generate(&mut rand::rngs::OsRng);
    let ephemeral_pk = ephemeral.public_key();

    let salsa_box = SalsaBox::new(recipient_pk, &ephemeral);

    let mut nonce_bytes = [0u8; 24];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);

    let ciphertext = salsa_box
        .encrypt(crypto_box::Nonce::from_slice(&nonce_bytes), key_bytes)
        .map_err(|e| CryptoError::Encryption(format!("envelope seal failed: {e}")))?;

    Ok(SealedKey {
        ephemeral_public_key: *ephemeral_pk.as_bytes(),
        nonce: nonce_bytes,
        ciphertext,
    })
}

/// Opens a sealed key with the recipient's secret key.
///
/// Fails with [`CryptoError::Decryption`] if the secret key does not match
/// the public key the envelope was sealed under, or the envelope was
/// tampered with; the two cases are not distinguished.
pub fn open_sealed_key(sealed: &SealedKey, recipient_sk: &SecretKey) -> CryptoResult<Vec<u8>> {
    let ephemeral_pk = PublicKey::from(sealed.ephemeral_public_key);
    let salsa_box = SalsaBox::new(&ephemeral_pk, recipient_sk);

    salsa_box
        .decrypt(
            crypto_box::Nonce::from_slice(&sealed.nonce),
            sealed.ciphertext.as_ref(),
        )
        .map_err(|_| CryptoError::Decryption)
}

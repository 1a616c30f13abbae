//! Cryptographic primitives for Parcel.
//!
//! Provides the key material handling for the delivery platform:
//! - Argon2id for deriving wrapping keys from user passwords
//! - ChaCha20-Poly1305 for authenticated encryption of private-key blobs
//! - X25519 envelope sealing for distributing project keys to members
//!
//! # Architecture
//!
//! The key hierarchy has three tiers:
//!
//! 1. **Wrapping key**: derived from the user's password with Argon2id.
//!    Never stored, re-derived on every unlock.
//!
//! 2. **Identity key pair**: a per-user X25519 key pair. The public half is
//!    persisted in the clear; the private half only ever exists on disk
//!    inside a wrapping-key-encrypted vault blob.
//!
//! 3. **Project key**: a random symmetric key per project. It is never
//!    stored directly; every authorized member holds their own copy,
//!    sealed under their public key.
//!
//! This split means a password change only re-encrypts one small blob, and
//! granting or revoking a member touches only that member's sealed copy.

mod cipher;
mod error;
pub mod envelope;
mod key;
pub mod vault;

pub use cipher::{decrypt, encrypt, EncryptedData, NONCE_SIZE, TAG_SIZE};
pub use crypto_box::{PublicKey, SecretKey};
pub use envelope::{
    generate_identity_keypair, open_sealed_key, seal_key, IdentityKeyPair, SealedKey,
};
pub use error::{CryptoError, CryptoResult};
pub use key::{
    derive_wrapping_key, KdfParams, ProjectKey, Salt, WrappingKey, KEY_SIZE, SALT_SIZE,
};
pub use vault::{open_private_key, reseal_private_key, seal_private_key, VaultedKey};

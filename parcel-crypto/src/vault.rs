//! Password-protected private key storage.
//!
//! A [`VaultedKey`] bundles the Argon2id salt and cost parameters with the
//! encrypted private key, so the password is the only input needed to open
//! it. The plaintext private key never touches storage.

use crate::cipher::{decrypt, encrypt, EncryptedData};
use crate::error::{CryptoError, CryptoResult};
use crate::key::{derive_wrapping_key, KdfParams, Salt, KEY_SIZE};
use crypto_box::SecretKey;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

/// Private key encrypted with a password (Argon2id -> ChaCha20-Poly1305).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VaultedKey {
    pub salt: Salt,
    pub params: KdfParams,
    pub encrypted: EncryptedData,
}

/// Seals a private key under a password with a fresh salt.
pub fn seal_private_key(
    sk: &SecretKey,
    password: &str,
    params: &KdfParams,
) -> CryptoResult<VaultedKey> {
    let salt = Salt::random();
    let wrapping_key = derive_wrapping_key(password, &salt, params)?;
    let encrypted = encrypt(&wrapping_key, &sk.to_bytes())?;

    Ok(VaultedKey {
        salt,
        params: *params,
        encrypted,
    })
}

/// Opens a vaulted private key with a password.
///
/// A wrong password and a corrupted blob fail identically with
/// [`CryptoError::Decryption`].
pub fn open_private_key(vaulted: &VaultedKey, password: &str) -> CryptoResult<SecretKey> {
    let wrapping_key = derive_wrapping_key(password, &vaulted.salt, &vaulted.params)?;
    let mut plaintext = decrypt(&wrapping_key, &vaulted.encrypted)?;

    if plaintext.len() != KEY_SIZE {
        plaintext.zeroize();
        return Err(CryptoError::InvalidKeyLength {
            expected: KEY_SIZE,
            actual: plaintext.len(),
        });
    }

    let mut bytes = [0u8; KEY_SIZE];
    bytes.copy_from_slice(&plaintext);
    plaintext.zeroize();
    let sk = SecretKey::from(bytes);
    bytes.zeroize();
    Ok(sk)
}

/// Re-seals the same private key bytes under a new password.
///
/// Generates a fresh salt; the key pair itself is unchanged, so public-key
/// envelopes sealed for this identity stay valid.
pub fn reseal_private_key(
    vaulted: &VaultedKey,
    old_password: &str,
    new_password: &str,
    params: &KdfParams,
) -> CryptoResult<VaultedKey> {
    let sk = open_private_key(vaulted, old_password)?;
    seal_private_key(&sk, new_password, params)
}

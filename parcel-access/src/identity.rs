//! Per-user identity key management.
//!
//! Each user owns one long-term X25519 key pair. The public half is
//! persisted in the clear for envelope sealing; the private half only ever
//! exists on disk inside the password-gated vault blob. Key-pair rotation
//! is an explicit administrative operation; it is never implied by a
//! password change.

use crate::error::{AccessError, AccessResult};
use parcel_crypto::{
    generate_identity_keypair, open_private_key, seal_private_key, IdentityKeyPair, KdfParams,
    SecretKey, VaultedKey,
};
use parcel_store::UserRecord;

/// Storable output of identity creation: the public key plus the vault
/// blob holding the private half.
pub struct IdentityKeys {
    pub public_key: [u8; 32],
    pub vaulted_key: VaultedKey,
}

/// Generates a fresh identity key pair sealed under `password`.
///
/// Called exactly once per user at registration; rotation goes through
/// [`rotate_identity`].
pub fn create_identity(password: &str, params: &KdfParams) -> AccessResult<IdentityKeys> {
    let keypair = generate_identity_keypair();
    let vaulted_key = seal_private_key(&keypair.secret, password, params)?;
    Ok(IdentityKeys {
        public_key: keypair.public_bytes(),
        vaulted_key,
    })
}

/// Unlocks a user's private key with their password.
///
/// Every vault failure (wrong password, tampered blob) surfaces as
/// [`AccessError::Authentication`]; callers cannot tell them apart.
pub fn unlock_identity(user: &UserRecord, password: &str) -> AccessResult<SecretKey> {
    open_private_key(&user.vaulted_key, password).map_err(|_| AccessError::Authentication)
}

/// Output of an identity rotation: the unlocked old key (for re-sealing
/// existing envelopes) and the freshly vaulted replacement.
pub struct RotatedIdentity {
    pub old_secret: SecretKey,
    pub new_keypair: IdentityKeyPair,
    pub new_vaulted_key: VaultedKey,
}

/// Rotates a user's key pair: proves knowledge of the password, generates
/// a fresh pair and seals it under the same password.
///
/// The caller must re-seal every envelope of the user under the new public
/// key atomically with the record swap, or existing grants become
/// unopenable.
pub fn rotate_identity(
    user: &UserRecord,
    password: &str,
    params: &KdfParams,
) -> AccessResult<RotatedIdentity> {
    let old_secret = unlock_identity(user, password)?;
    let new_keypair = generate_identity_keypair();
    let new_vaulted_key = seal_private_key(&new_keypair.secret, password, params)?;
    Ok(RotatedIdentity {
        old_secret,
        new_keypair,
        new_vaulted_key,
    })
}

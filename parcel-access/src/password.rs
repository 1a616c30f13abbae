//! Password change and reset coordination.
//!
//! A password change with the old password re-seals the *same* private key
//! bytes under a fresh wrapping key: the key pair is untouched and every
//! project envelope stays valid. A token-based reset cannot recover the
//! vault (the old password is the only thing that opens it), so it
//! installs a fresh key pair; stale envelopes are then surfaced by
//! renewal and repaired by re-grant.

use crate::error::{AccessError, AccessResult};
use chrono::Utc;
use parcel_crypto::{generate_identity_keypair, reseal_private_key, seal_private_key, KdfParams};
use parcel_store::{PlatformStore, ResetTokenRecord};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Proof of authorization for a password change.
pub enum Credential<'a> {
    /// Knowledge of the current password, proven by unlocking the vault.
    OldPassword(&'a str),
    /// A single-use reset token issued out of band.
    ResetToken(&'a str),
}

/// Coordinates password changes and resets.
pub struct PasswordChangeCoordinator {
    store: Arc<PlatformStore>,
    kdf_params: KdfParams,
}

impl PasswordChangeCoordinator {
    pub fn new(store: Arc<PlatformStore>) -> Self {
        Self::with_kdf_params(store, KdfParams::default())
    }

    pub fn with_kdf_params(store: Arc<PlatformStore>, kdf_params: KdfParams) -> Self {
        Self { store, kdf_params }
    }

    /// Issues a single-use reset token for a user. Refused for inactive
    /// accounts.
    pub fn issue_reset_token(&self, user_id: &str, ttl_hours: i64) -> AccessResult<String> {
        let user = self
            .store
            .get_user(user_id)?
            .ok_or_else(|| AccessError::UserNotFound(user_id.to_string()))?;
        if !user.active {
            return Err(AccessError::InactiveUser);
        }

        let token = Uuid::new_v4().to_string();
        self.store.insert_reset_token(&ResetTokenRecord {
            token: token.clone(),
            user_id: user_id.to_string(),
            expires_at: Utc::now().timestamp_millis() + ttl_hours * 3_600_000,
            used: false,
        })?;
        info!(user_id, "issued password reset token");
        Ok(token)
    }

    /// Changes a user's password.
    ///
    /// Fails with `InactiveUser` before any credential is examined. With
    /// the old password, the same private key is re-sealed under fresh
    /// salt/params and the vault blob replaced in a single write; no
    /// envelope is touched, the public key is unchanged. With a reset
    /// token, a fresh key pair is installed (see module docs); the token
    /// is consumed whether or not the remaining checks pass.
    pub fn change_password(
        &self,
        user_id: &str,
        credential: Credential<'_>,
        new_password: &str,
    ) -> AccessResult<()> {
        let user = self
            .store
            .get_user(user_id)?
            .ok_or(AccessError::Authentication)?;
        if !user.active {
            return Err(AccessError::InactiveUser);
        }

        match credential {
            Credential::OldPassword(old_password) => {
                let resealed = reseal_private_key(
                    &user.vaulted_key,
                    old_password,
                    new_password,
                    &self.kdf_params,
                )
                .map_err(|err| match err {
                    parcel_crypto::CryptoError::Decryption => AccessError::Authentication,
                    other => other.into(),
                })?;
                self.store.replace_user_vault(user_id, &resealed)?;
                info!(user_id, "password changed, identity preserved");
            }
            Credential::ResetToken(token) => {
                self.redeem_reset_token(user_id, token)?;

                let keypair = generate_identity_keypair();
                let vaulted =
                    seal_private_key(&keypair.secret, new_password, &self.kdf_params)?;
                self.store
                    .update_user_keys(user_id, &keypair.public_bytes(), &vaulted)?;
                info!(user_id, "password reset, key pair replaced");
            }
        }
        Ok(())
    }

    /// Validates and consumes a reset token. Single use: the store marks
    /// it used atomically with the read, so a second redemption, even a
    /// concurrent one, sees a burnt token. The store only burns the token
    /// for its own user, so a mismatched attempt cannot consume the
    /// rightful owner's token.
    fn redeem_reset_token(&self, user_id: &str, token: &str) -> AccessResult<()> {
        let record = self
            .store
            .take_reset_token(token, user_id)?
            .ok_or(AccessError::Authentication)?;

        if record.user_id != user_id {
            return Err(AccessError::Authentication);
        }
        if record.used || Utc::now().timestamp_millis() > record.expires_at {
            return Err(AccessError::ExpiredToken);
        }
        Ok(())
    }
}

//! Project key envelope management.
//!
//! One symmetric key exists per project, but it is never stored as such:
//! every authorized member holds their own copy, sealed under their public
//! key in a `(project_id, user_id)`-unique envelope row. Granting writes a
//! new row; revoking deletes one. No shared value is ever mutated, so no
//! lock on the project key itself is needed.

use crate::error::{AccessError, AccessResult};
use chrono::Utc;
use parcel_crypto::{open_sealed_key, seal_key, ProjectKey, PublicKey, SecretKey};
use parcel_store::{EnvelopeRecord, PlatformStore, UserRecord};
use std::sync::Arc;
use tracing::{debug, info};
use zeroize::Zeroize;

/// Seals and opens per-member project key envelopes against the store.
pub struct ProjectKeyEnvelopeManager {
    store: Arc<PlatformStore>,
}

impl ProjectKeyEnvelopeManager {
    pub fn new(store: Arc<PlatformStore>) -> Self {
        Self { store }
    }

    /// Generates a fresh project key. The key exists only transiently until
    /// sealed into a member envelope.
    pub fn create_project_key(&self) -> ProjectKey {
        ProjectKey::generate()
    }

    /// Seals `key` for `recipient` and stores the envelope.
    ///
    /// Granting a pair that already holds an envelope is idempotent
    /// success. When two grants race, the store's primary key picks one
    /// winner; the loser surfaces [`AccessError::ConcurrencyConflict`].
    pub fn grant(
        &self,
        project_id: &str,
        recipient: &UserRecord,
        key: &ProjectKey,
    ) -> AccessResult<()> {
        if self
            .store
            .get_envelope(project_id, &recipient.user_id)?
            .is_some()
        {
            debug!(
                project_id,
                user_id = %recipient.user_id,
                "grant already exists, nothing to do"
            );
            return Ok(());
        }

        let recipient_pk = PublicKey::from(recipient.public_key);
        let sealed_key = seal_key(key.as_bytes(), &recipient_pk)?;
        self.store.insert_envelope(&EnvelopeRecord {
            project_id: project_id.to_string(),
            user_id: recipient.user_id.clone(),
            sealed_key,
            created_at: Utc::now().timestamp_millis(),
        })?;

        info!(project_id, user_id = %recipient.user_id, "granted project access");
        Ok(())
    }

    /// Opens the unique envelope for `(project_id, user_id)` with the
    /// member's private key.
    ///
    /// Fails with [`AccessError::EnvelopeNotFound`] when no grant exists
    /// (never another user's envelope) and [`AccessError::Decryption`] when
    /// the private key does not match the key the envelope was sealed
    /// under (e.g. after an uncoordinated identity rotation).
    pub fn access(
        &self,
        project_id: &str,
        user_id: &str,
        secret: &SecretKey,
    ) -> AccessResult<ProjectKey> {
        let envelope = self
            .store
            .get_envelope(project_id, user_id)?
            .ok_or(AccessError::EnvelopeNotFound)?;

        let mut key_bytes =
            open_sealed_key(&envelope.sealed_key, secret).map_err(|_| AccessError::Decryption)?;
        let key = ProjectKey::from_slice(&key_bytes);
        key_bytes.zeroize();
        Ok(key?)
    }

    /// Deletes the envelope for `(project_id, user_id)`. Idempotent:
    /// revoking absent access is a no-op. A transient storage failure is
    /// retried once before surfacing.
    ///
    /// Revocation does not rotate the project key for remaining members:
    /// it prevents future unsealing from this record, but offers no forward
    /// secrecy against a member who exfiltrated the key before revocation.
    pub fn revoke(&self, project_id: &str, user_id: &str) -> AccessResult<()> {
        let deleted = match self.store.delete_envelope(project_id, user_id) {
            Ok(deleted) => deleted,
            Err(_) => self.store.delete_envelope(project_id, user_id)?,
        };
        if deleted {
            info!(project_id, user_id, "revoked project access");
        }
        Ok(())
    }
}

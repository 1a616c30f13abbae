//! Access lifecycle orchestration.
//!
//! Single authority for the per-(project, user) access state machine
//! `NoAccess -> Invited -> Granted -> Revoked` and for the project-status
//! preconditions on destructive operations. All multi-row mutations go
//! through the store's transactions; crypto state is never left half
//! applied.

use crate::error::{AccessError, AccessResult};
use crate::identity::{create_identity, rotate_identity, unlock_identity};
use crate::project_keys::ProjectKeyEnvelopeManager;
use chrono::Utc;
use parcel_crypto::{
    generate_identity_keypair, open_private_key, open_sealed_key, seal_key, seal_private_key,
    KdfParams, ProjectKey, PublicKey,
};
use parcel_store::{
    EnvelopeRecord, InviteRecord, PendingGrant, PlatformStore, ProjectRecord, ProjectStatus,
    UserRecord,
};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use zeroize::Zeroize;

/// Access state of a (project, user) pair.
///
/// `Revoked` is terminal until a fresh invite/grant cycle: once the
/// envelope row is deleted the stored state is indistinguishable from
/// `NoAccess`, which is exactly the re-entry requirement. Queries
/// therefore report `NoAccess` after a revocation; the `Revoked` variant
/// exists for callers that track the transition themselves and is never
/// produced by [`AccessLifecycleOrchestrator::access_state`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessState {
    NoAccess,
    Invited,
    Granted,
    Revoked,
}

/// Outcome of an access renewal: which of the user's grants still open
/// under their current private key, and which were sealed for a stale
/// public key and need re-granting.
#[derive(Clone, Debug, Default)]
pub struct RenewalReport {
    pub valid: Vec<String>,
    pub broken: Vec<String>,
}

/// Coordinates invites, grants, renewal and revocation as units of work.
pub struct AccessLifecycleOrchestrator {
    store: Arc<PlatformStore>,
    envelopes: ProjectKeyEnvelopeManager,
    kdf_params: KdfParams,
}

impl AccessLifecycleOrchestrator {
    pub fn new(store: Arc<PlatformStore>) -> Self {
        Self::with_kdf_params(store, KdfParams::default())
    }

    pub fn with_kdf_params(store: Arc<PlatformStore>, kdf_params: KdfParams) -> Self {
        Self {
            envelopes: ProjectKeyEnvelopeManager::new(store.clone()),
            store,
            kdf_params,
        }
    }

    pub fn envelopes(&self) -> &ProjectKeyEnvelopeManager {
        &self.envelopes
    }

    // ------------------------------------------------------------------
    // Registration and projects
    // ------------------------------------------------------------------

    /// Registers a user: generates their identity key pair, seals the
    /// private half under `password` and stores the record.
    pub fn register_user(&self, user_id: &str, password: &str) -> AccessResult<UserRecord> {
        let identity = create_identity(password, &self.kdf_params)?;
        let user = UserRecord {
            user_id: user_id.to_string(),
            public_key: identity.public_key,
            vaulted_key: identity.vaulted_key,
            active: true,
            created_at: Utc::now().timestamp_millis(),
        };
        self.store.insert_user(&user)?;
        info!(user_id, "registered user identity");
        Ok(user)
    }

    /// Creates a project with a fresh project key, sealed for the owner as
    /// the first member.
    pub fn create_project(&self, project_id: &str, owner_id: &str) -> AccessResult<()> {
        let owner = self.require_active_user(owner_id)?;
        self.store.insert_project(&ProjectRecord {
            project_id: project_id.to_string(),
            status: ProjectStatus::Available,
            created_at: Utc::now().timestamp_millis(),
        })?;

        let key = self.envelopes.create_project_key();
        self.envelopes.grant(project_id, &owner, &key)?;
        info!(project_id, owner_id, "created project");
        Ok(())
    }

    /// Moves a project to a new status. `Deleted` is terminal.
    pub fn set_project_status(&self, project_id: &str, status: ProjectStatus) -> AccessResult<()> {
        let project = self.require_project(project_id)?;
        if project.status == ProjectStatus::Deleted {
            return Err(AccessError::ProjectStatus {
                status: project.status.as_str(),
            });
        }
        self.store.set_project_status(project_id, status)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Grant / access / revoke
    // ------------------------------------------------------------------

    /// Grants `grantee` access to a project by re-sealing the project key
    /// from the grantor's own envelope. The grantor proves their password;
    /// the grantee only needs a registered key pair.
    pub fn grant_access(
        &self,
        project_id: &str,
        grantor_id: &str,
        grantor_password: &str,
        grantee_id: &str,
    ) -> AccessResult<()> {
        let grantee = self.require_active_user(grantee_id)?;
        let project = self.require_project(project_id)?;
        if project.status == ProjectStatus::Deleted {
            return Err(AccessError::ProjectStatus {
                status: project.status.as_str(),
            });
        }

        let grantor = self.credential_user(grantor_id)?;
        let secret = unlock_identity(&grantor, grantor_password)?;
        let key = self.envelopes.access(project_id, grantor_id, &secret)?;
        self.envelopes.grant(project_id, &grantee, &key)
    }

    /// Unseals the caller's copy of the project key. The key is handed to
    /// the bulk-data pipeline and must not outlive the request.
    pub fn access_project(
        &self,
        project_id: &str,
        user_id: &str,
        password: &str,
    ) -> AccessResult<ProjectKey> {
        let user = self.credential_user(user_id)?;
        let secret = unlock_identity(&user, password)?;
        self.envelopes.access(project_id, user_id, &secret)
    }

    /// Revokes a member's access. Idempotent; re-entry requires a fresh
    /// invite/grant cycle.
    pub fn revoke_access(&self, project_id: &str, user_id: &str) -> AccessResult<()> {
        self.envelopes.revoke(project_id, user_id)
    }

    // ------------------------------------------------------------------
    // Invites
    // ------------------------------------------------------------------

    /// Issues (or refreshes) an invite for `email` covering `project_ids`.
    ///
    /// No envelope row is created yet; the invitee has no key pair.
    /// Instead each project key is unsealed from the sponsor's envelope and
    /// re-sealed under an invite-scoped keypair whose secret is vaulted
    /// under the returned token, so acceptance is self-contained.
    pub fn issue_invite(
        &self,
        email: &str,
        project_ids: &[&str],
        sponsor_id: &str,
        sponsor_password: &str,
        ttl_hours: i64,
    ) -> AccessResult<String> {
        let sponsor = self.credential_user(sponsor_id)?;
        if !sponsor.active {
            return Err(AccessError::InactiveUser);
        }
        for project_id in project_ids {
            let project = self.require_project(project_id)?;
            if project.status == ProjectStatus::Deleted {
                return Err(AccessError::ProjectStatus {
                    status: project.status.as_str(),
                });
            }
        }

        let secret = unlock_identity(&sponsor, sponsor_password)?;
        let token = Uuid::new_v4().to_string();
        let invite_keypair = generate_identity_keypair();
        let vaulted_secret = seal_private_key(&invite_keypair.secret, &token, &self.kdf_params)?;

        let mut pending_grants = Vec::with_capacity(project_ids.len());
        for project_id in project_ids {
            let key = self.envelopes.access(project_id, sponsor_id, &secret)?;
            let sealed_key = seal_key(key.as_bytes(), &invite_keypair.public)?;
            pending_grants.push(PendingGrant {
                project_id: project_id.to_string(),
                sealed_key,
            });
        }

        self.store.upsert_invite(&InviteRecord {
            email: email.to_string(),
            token: token.clone(),
            sponsor_user_id: sponsor_id.to_string(),
            vaulted_secret,
            pending_grants,
            expires_at: Utc::now().timestamp_millis() + ttl_hours * 3_600_000,
        })?;

        info!(email, projects = project_ids.len(), "issued invite");
        Ok(token)
    }

    /// Completes registration from an invite: creates the user identity and
    /// one envelope per pending project, and consumes the invite in one
    /// transaction, all-or-nothing. Partial application (some projects
    /// granted, invite left pending) cannot occur.
    pub fn accept_invite(
        &self,
        token: &str,
        user_id: &str,
        password: &str,
    ) -> AccessResult<UserRecord> {
        let invite = self
            .store
            .get_invite_by_token(token)?
            .ok_or(AccessError::InviteNotFound)?;

        if Utc::now().timestamp_millis() > invite.expires_at {
            self.store.delete_invite(&invite.email)?;
            return Err(AccessError::ExpiredToken);
        }

        // The token is the credential protecting the invite secret
        let invite_secret = open_private_key(&invite.vaulted_secret, token)
            .map_err(|_| AccessError::Authentication)?;

        let identity = create_identity(password, &self.kdf_params)?;
        let user = UserRecord {
            user_id: user_id.to_string(),
            public_key: identity.public_key,
            vaulted_key: identity.vaulted_key,
            active: true,
            created_at: Utc::now().timestamp_millis(),
        };

        let recipient_pk = PublicKey::from(user.public_key);
        let now = Utc::now().timestamp_millis();
        let mut envelopes = Vec::with_capacity(invite.pending_grants.len());
        for grant in &invite.pending_grants {
            let mut key_bytes = open_sealed_key(&grant.sealed_key, &invite_secret)
                .map_err(|_| AccessError::Decryption)?;
            let key = ProjectKey::from_slice(&key_bytes);
            key_bytes.zeroize();
            let key = key?;
            envelopes.push(EnvelopeRecord {
                project_id: grant.project_id.clone(),
                user_id: user_id.to_string(),
                sealed_key: seal_key(key.as_bytes(), &recipient_pk)?,
                created_at: now,
            });
        }

        self.store.accept_invite(&invite.email, &user, &envelopes)?;
        info!(user_id, projects = envelopes.len(), "accepted invite");
        Ok(user)
    }

    /// Current access state for a (project, user) pair, with the pending
    /// invite for `email` considered.
    pub fn access_state(
        &self,
        project_id: &str,
        user_id: &str,
        email: &str,
    ) -> AccessResult<AccessState> {
        if self.store.get_envelope(project_id, user_id)?.is_some() {
            return Ok(AccessState::Granted);
        }
        if let Some(invite) = self.store.get_invite(email)? {
            let pending = invite.project_ids().any(|pid| pid == project_id);
            if pending && Utc::now().timestamp_millis() <= invite.expires_at {
                return Ok(AccessState::Invited);
            }
        }
        Ok(AccessState::NoAccess)
    }

    // ------------------------------------------------------------------
    // Renewal and rotation
    // ------------------------------------------------------------------

    /// Re-validates every grant of a user after a credential event
    /// (password change, reset): opens each envelope under the unlocked
    /// private key and reports which are stale.
    ///
    /// Broken envelopes appear when the key pair changed underneath them
    /// (token-based reset, uncoordinated rotation); they are repaired with
    /// [`Self::restore_access`]. A plain password change breaks nothing;
    /// the public key is unchanged.
    pub fn renew_access(&self, user_id: &str, password: &str) -> AccessResult<RenewalReport> {
        let user = self.credential_user(user_id)?;
        if !user.active {
            return Err(AccessError::InactiveUser);
        }
        let secret = unlock_identity(&user, password)?;

        let mut report = RenewalReport::default();
        for envelope in self.store.list_user_envelopes(user_id)? {
            match open_sealed_key(&envelope.sealed_key, &secret) {
                Ok(_) => report.valid.push(envelope.project_id),
                Err(_) => report.broken.push(envelope.project_id),
            }
        }

        if report.broken.is_empty() {
            info!(user_id, valid = report.valid.len(), "renewed access");
        } else {
            warn!(
                user_id,
                valid = report.valid.len(),
                broken = report.broken.len(),
                "renewal found stale envelopes"
            );
        }
        Ok(report)
    }

    /// Re-establishes a member's access after their key pair changed:
    /// revokes the stale envelope and re-seals the project key, supplied
    /// from the grantor's own envelope, under the member's current public
    /// key.
    pub fn restore_access(
        &self,
        project_id: &str,
        user_id: &str,
        grantor_id: &str,
        grantor_password: &str,
    ) -> AccessResult<()> {
        let target = self.require_active_user(user_id)?;
        let project = self.require_project(project_id)?;
        if project.status == ProjectStatus::Deleted {
            return Err(AccessError::ProjectStatus {
                status: project.status.as_str(),
            });
        }

        let grantor = self.credential_user(grantor_id)?;
        let secret = unlock_identity(&grantor, grantor_password)?;
        let key = self.envelopes.access(project_id, grantor_id, &secret)?;

        // Revoke-then-reseal in one commit: the member is never left
        // without a row between the delete and the insert
        let recipient_pk = PublicKey::from(target.public_key);
        self.store.replace_envelope(&EnvelopeRecord {
            project_id: project_id.to_string(),
            user_id: user_id.to_string(),
            sealed_key: seal_key(key.as_bytes(), &recipient_pk)?,
            created_at: Utc::now().timestamp_millis(),
        })?;
        info!(project_id, user_id, "restored project access");
        Ok(())
    }

    /// Rotates a user's identity key pair (explicit administrative
    /// operation). Every existing envelope is re-sealed under the new
    /// public key atomically with the record swap, so no grant breaks.
    pub fn rotate_user_identity(&self, user_id: &str, password: &str) -> AccessResult<()> {
        let user = self.credential_user(user_id)?;
        if !user.active {
            return Err(AccessError::InactiveUser);
        }
        let rotated = rotate_identity(&user, password, &self.kdf_params)?;

        let new_pk = rotated.new_keypair.public.clone();
        let now = Utc::now().timestamp_millis();
        let mut resealed = Vec::new();
        for envelope in self.store.list_user_envelopes(user_id)? {
            let mut key_bytes = open_sealed_key(&envelope.sealed_key, &rotated.old_secret)
                .map_err(|_| AccessError::Decryption)?;
            let key = ProjectKey::from_slice(&key_bytes);
            key_bytes.zeroize();
            let key = key?;
            resealed.push(EnvelopeRecord {
                project_id: envelope.project_id,
                user_id: user_id.to_string(),
                sealed_key: seal_key(key.as_bytes(), &new_pk)?,
                created_at: now,
            });
        }

        self.store.replace_user_identity(
            user_id,
            &rotated.new_keypair.public_bytes(),
            &rotated.new_vaulted_key,
            &resealed,
        )?;
        info!(user_id, envelopes = resealed.len(), "rotated identity key pair");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Destructive operations
    // ------------------------------------------------------------------

    /// Approves removal of a project's uploaded content. Pure precondition
    /// gate: only an `Available` project may have content removed; the
    /// actual object deletion belongs to the bulk-data pipeline.
    pub fn remove_project_content(&self, project_id: &str) -> AccessResult<()> {
        let project = self.require_project(project_id)?;
        if project.status != ProjectStatus::Available {
            return Err(AccessError::ProjectStatus {
                status: project.status.as_str(),
            });
        }
        info!(project_id, "project content removal permitted");
        Ok(())
    }

    /// Deletes an account and purges every envelope referencing it.
    pub fn delete_account(&self, user_id: &str) -> AccessResult<()> {
        self.store.delete_user(user_id)?;
        info!(user_id, "deleted account and purged envelopes");
        Ok(())
    }

    /// Marks an account inactive; credential and renewal operations are
    /// refused until reactivation.
    pub fn deactivate_user(&self, user_id: &str) -> AccessResult<()> {
        self.store.set_user_active(user_id, false)?;
        Ok(())
    }

    pub fn reactivate_user(&self, user_id: &str) -> AccessResult<()> {
        self.store.set_user_active(user_id, true)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    /// Lookup on an operational (non-credential) path.
    fn require_active_user(&self, user_id: &str) -> AccessResult<UserRecord> {
        let user = self
            .store
            .get_user(user_id)?
            .ok_or_else(|| AccessError::UserNotFound(user_id.to_string()))?;
        if !user.active {
            return Err(AccessError::InactiveUser);
        }
        Ok(user)
    }

    /// Lookup on a credential path: a missing user is indistinguishable
    /// from a wrong password, to prevent account enumeration.
    fn credential_user(&self, user_id: &str) -> AccessResult<UserRecord> {
        self.store
            .get_user(user_id)?
            .ok_or(AccessError::Authentication)
    }

    fn require_project(&self, project_id: &str) -> AccessResult<ProjectRecord> {
        self.store
            .get_project(project_id)?
            .ok_or_else(|| AccessError::ProjectNotFound(project_id.to_string()))
    }
}

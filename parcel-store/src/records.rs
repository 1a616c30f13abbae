//! Persisted entity records.

use parcel_crypto::{SealedKey, VaultedKey};
use serde::{Deserialize, Serialize};

/// A registered user: public identity key plus the password-gated vault
/// holding the private half.
#[derive(Clone, Debug)]
pub struct UserRecord {
    pub user_id: String,
    /// X25519 public key, persisted in the clear.
    pub public_key: [u8; 32],
    /// Private key encrypted under the password-derived wrapping key,
    /// bundled with its KDF salt and cost parameters.
    pub vaulted_key: VaultedKey,
    pub active: bool,
    pub created_at: i64,
}

/// Project lifecycle status. Drives which destructive operations are
/// permitted; a project is never silently deleted while envelopes
/// reference it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectStatus {
    Invited,
    Available,
    Archived,
    Deleted,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Invited => "Invited",
            ProjectStatus::Available => "Available",
            ProjectStatus::Archived => "Archived",
            ProjectStatus::Deleted => "Deleted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Invited" => Some(ProjectStatus::Invited),
            "Available" => Some(ProjectStatus::Available),
            "Archived" => Some(ProjectStatus::Archived),
            "Deleted" => Some(ProjectStatus::Deleted),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ProjectRecord {
    pub project_id: String,
    pub status: ProjectStatus,
    pub created_at: i64,
}

/// One member's sealed copy of a project key. Unique per
/// `(project_id, user_id)`; never updated in place; membership changes are
/// revoke-then-reseal.
#[derive(Clone, Debug)]
pub struct EnvelopeRecord {
    pub project_id: String,
    pub user_id: String,
    pub sealed_key: SealedKey,
    pub created_at: i64,
}

/// A project key queued for an invitee, sealed under the invite keypair.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PendingGrant {
    pub project_id: String,
    pub sealed_key: SealedKey,
}

/// A pending invitation: projects to grant once the invitee has completed
/// registration and owns a key pair. Consumed atomically on acceptance.
///
/// No envelope row exists before acceptance. Instead, the sponsor
/// seals each project key under an invite-scoped keypair whose secret half
/// is vaulted under the invite token, so acceptance needs no third party.
#[derive(Clone, Debug)]
pub struct InviteRecord {
    pub email: String,
    pub token: String,
    /// The member who issued the invite and supplied the project keys.
    pub sponsor_user_id: String,
    /// Invite keypair secret, encrypted under a token-derived key.
    pub vaulted_secret: VaultedKey,
    /// Project keys queued for grant, applied all-or-nothing on acceptance.
    pub pending_grants: Vec<PendingGrant>,
    pub expires_at: i64,
}

impl InviteRecord {
    /// Projects this invite will grant.
    pub fn project_ids(&self) -> impl Iterator<Item = &str> {
        self.pending_grants.iter().map(|g| g.project_id.as_str())
    }
}

/// Single-use password reset token.
#[derive(Clone, Debug)]
pub struct ResetTokenRecord {
    pub token: String,
    pub user_id: String,
    pub expires_at: i64,
    pub used: bool,
}

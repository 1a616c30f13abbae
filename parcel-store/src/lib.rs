//! DuckDB storage layer for Parcel.
//!
//! Persists the entities of the key-management core: users (public key +
//! vaulted private key), projects, per-member sealed project key envelopes,
//! invites and password reset tokens.
//!
//! # Architecture
//!
//! - All durability-affecting multi-row writes run inside a single
//!   transaction; a crash can never leave a user half-migrated.
//! - Envelope rows are unique per `(project_id, user_id)`; the primary key
//!   serializes concurrent grant attempts, the loser sees
//!   [`StoreError::Conflict`].
//! - Key material is stored only in its encrypted form; the store never
//!   sees a plaintext private key or project key.

mod error;
mod records;
mod store;

pub use error::{StoreError, StoreResult};
pub use records::{
    EnvelopeRecord, InviteRecord, PendingGrant, ProjectRecord, ProjectStatus, ResetTokenRecord,
    UserRecord,
};
pub use store::PlatformStore;

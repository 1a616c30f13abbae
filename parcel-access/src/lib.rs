//! Access orchestration for Parcel.
//!
//! Ties the crypto primitives and the platform store together into the
//! operations the delivery platform exposes:
//!
//! - **identity**: per-user key pairs, password-gated unlock, rotation
//! - **project_keys**: per-member sealed project key envelopes
//! - **lifecycle**: invites, acceptance, grant/revoke, renewal, the
//!   project-status gate on destructive operations
//! - **password**: password change and single-use token reset
//!
//! Every operation is stateless between calls: private keys and project
//! keys exist only as transient values scoped to a single request and are
//! zeroized on drop. The store is the only shared mutable resource, and
//! every multi-row mutation runs in one transaction.

mod error;
pub mod identity;
pub mod lifecycle;
pub mod password;
pub mod project_keys;

pub use error::{AccessError, AccessResult};
pub use identity::{create_identity, rotate_identity, unlock_identity, IdentityKeys};
pub use lifecycle::{AccessLifecycleOrchestrator, AccessState, RenewalReport};
pub use password::{Credential, PasswordChangeCoordinator};
pub use project_keys::ProjectKeyEnvelopeManager;

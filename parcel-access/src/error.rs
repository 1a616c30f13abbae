//! Access layer error types.
//!
//! Propagation policy: cryptographic failures are surfaced uniformly so the
//! API boundary cannot be used as an oracle. A wrong password, a missing
//! user on a credential path and a tampered vault blob all come back as
//! `Authentication`; an envelope that will not open under the presented
//! private key comes back as `Decryption` with no further detail.

use parcel_store::StoreError;
use thiserror::Error;

/// Result type for access operations.
pub type AccessResult<T> = Result<T, AccessError>;

/// Errors from the orchestration layer.
#[derive(Debug, Error)]
pub enum AccessError {
    #[error("authentication failed")]
    Authentication,

    #[error("decryption failed")]
    Decryption,

    #[error("KDF cost parameters below configured minimum")]
    WeakParameters,

    #[error("no project key envelope exists for this grant")]
    EnvelopeNotFound,

    #[error("user account is not active")]
    InactiveUser,

    #[error("operation not permitted in project status {status}")]
    ProjectStatus { status: &'static str },

    #[error("token is expired or already used")]
    ExpiredToken,

    #[error("concurrent grant conflict")]
    ConcurrencyConflict,

    #[error("no pending invite matches this token")]
    InviteNotFound,

    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("project not found: {0}")]
    ProjectNotFound(String),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for AccessError {
    fn from(err: StoreError) -> Self {
        match err {
            // A lost race on the (project_id, user_id) primary key
            StoreError::Conflict(_) => AccessError::ConcurrencyConflict,
            other => AccessError::Store(other),
        }
    }
}

impl From<parcel_crypto::CryptoError> for AccessError {
    fn from(err: parcel_crypto::CryptoError) -> Self {
        use parcel_crypto::CryptoError;
        match err {
            CryptoError::WeakParameters => AccessError::WeakParameters,
            CryptoError::Decryption => AccessError::Decryption,
            other => AccessError::Crypto(other.to_string()),
        }
    }
}

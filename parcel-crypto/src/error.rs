//! Crypto error types.

use thiserror::Error;

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors from the crypto layer.
///
/// `Decryption` deliberately carries no detail about *why* the operation
/// failed; a wrong password and a tampered blob produce the same error so
/// callers cannot be used as a padding/tag oracle.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("KDF cost parameters below configured minimum")]
    WeakParameters,

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("decryption failed")]
    Decryption,

    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },
}

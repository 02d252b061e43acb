//! Error types for the parley-crypto crate.

use parley_shared::ids::UserId;
use thiserror::Error;

/// Errors from individual cryptographic operations and the local key store.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Key material is malformed: wrong length, bad encoding, rejected point.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// AEAD authentication failed. Wrong key and tampered ciphertext are
    /// indistinguishable; no detail is attached on purpose.
    #[error("decryption failed")]
    DecryptFailed,

    /// A key-wrap or key-derivation step failed.
    #[error("key wrap error: {0}")]
    Wrap(String),

    /// Content encryption failed.
    #[error("content encryption error: {0}")]
    Content(String),

    /// Input exceeds the configured size ceiling.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// Local key store failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// OS keychain operation failed.
    #[error("keychain error: {0}")]
    Keychain(String),

    /// No credential found in the OS keychain for the requested entry.
    #[error("keychain entry not found")]
    KeychainEntryNotFound,

    /// OS keychain is not available on this platform — callers fall back to a
    /// passphrase-derived master key.
    #[error("keychain unavailable")]
    KeychainUnavailable,

    /// Serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<rusqlite::Error> for CryptoError {
    fn from(err: rusqlite::Error) -> Self {
        CryptoError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for CryptoError {
    fn from(err: serde_json::Error) -> Self {
        CryptoError::Serialization(err.to_string())
    }
}

impl From<keyring::Error> for CryptoError {
    fn from(err: keyring::Error) -> Self {
        match err {
            keyring::Error::NoEntry => CryptoError::KeychainEntryNotFound,
            keyring::Error::NoStorageAccess(_) | keyring::Error::PlatformFailure(_) => {
                CryptoError::KeychainUnavailable
            }
            other => CryptoError::Keychain(other.to_string()),
        }
    }
}

impl From<CryptoError> for parley_shared::error::ParleyError {
    fn from(err: CryptoError) -> Self {
        parley_shared::error::ParleyError::Crypto(err.to_string())
    }
}

/// Tagged failures from backup restore. Every caller matches exhaustively.
#[derive(Debug, Error)]
pub enum RecoveryError {
    /// The version field does not match; rejected before any cryptographic
    /// work, with no best-effort parsing of unknown versions.
    #[error("unsupported backup version: {found}")]
    UnsupportedVersion { found: u32 },

    /// AEAD authentication failed: wrong password and corruption are
    /// indistinguishable by design.
    #[error("backup decryption failed")]
    DecryptFailed,

    /// The backup structure is malformed.
    #[error("invalid backup: {0}")]
    InvalidBackup(String),
}

/// Tagged failures from room provisioning.
#[derive(Debug, Error)]
pub enum RoomError {
    /// One or more members have no published exchange key; nothing was
    /// created. Carries the offending ids.
    #[error("members without published keys: {0:?}")]
    MissingKeys(Vec<UserId>),

    /// A wrap or key-generation step failed; creation aborted, non-retryable.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// A collaborator read or write failed. Writes earlier in the same call
    /// may already exist; this layer does not roll them back.
    #[error("persistence error: {0}")]
    Db(#[from] StoreError),
}

/// Failure reported by a directory or storage collaborator.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct StoreError(pub String);

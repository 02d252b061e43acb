//! Password-protected export and restore of the local key pairs.
//!
//! A backup is `{version, salt, iv, data}`: a JSON bundle of all four keys
//! (two private, two public) sealed with AES-256-GCM under a key derived from
//! the password by PBKDF2-HMAC-SHA256. The version field is the sole
//! compatibility gate and is checked before any cryptographic work. Restore
//! has no partial success: every failing step returns a tagged error and
//! persists nothing.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::encoding;
use crate::error::{CryptoError, RecoveryError};
use crate::keys::{ExchangeKeyPair, IdentityKeyPair, LocalKeySet, KEY_LEN};

/// Current backup document version.
pub const BACKUP_VERSION: u32 = 1;

/// PBKDF2 iteration count — the dominant latency knob. High enough to resist
/// offline guessing, low enough to stay interactive on commodity hardware.
pub const PBKDF2_ITERATIONS: u32 = 210_000;

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;

/// Portable password-protected export of both local key pairs. Created on
/// demand, stored outside this subsystem, consumed on restore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyBackup {
    pub version: u32,
    pub salt: String,
    pub iv: String,
    pub data: String,
}

/// Plaintext bundle inside a backup: all four keys, base64.
#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
struct KeyBundle {
    identity_private: String,
    identity_public: String,
    exchange_private: String,
    exchange_public: String,
}

/// Export both key pairs under `password`.
pub fn create_backup(password: &str, keys: &LocalKeySet) -> Result<KeyBackup, CryptoError> {
    let bundle = KeyBundle {
        identity_private: encoding::encode(keys.identity.private_bytes().as_ref()),
        identity_public: keys.identity.public().to_base64(),
        exchange_private: encoding::encode(keys.exchange.private_bytes().as_ref()),
        exchange_public: keys.exchange.public().to_base64(),
    };
    let plaintext = Zeroizing::new(serde_json::to_vec(&bundle)?);

    let mut salt = [0u8; SALT_LEN];
    rand::rng().fill_bytes(&mut salt);
    let backup_key = derive_backup_key(password, &salt);

    let cipher = Aes256Gcm::new_from_slice(backup_key.as_ref())
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::rng().fill_bytes(&mut nonce_bytes);
    let sealed = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_slice())
        .map_err(|_| CryptoError::Content("backup seal failed".into()))?;

    Ok(KeyBackup {
        version: BACKUP_VERSION,
        salt: encoding::encode(&salt),
        iv: encoding::encode(&nonce_bytes),
        data: encoding::encode(&sealed),
    })
}

/// Recover both key pairs from `backup` with `password`.
///
/// Order matters: the version gate runs before any decoding or key
/// derivation. A wrong password and a corrupted document are reported
/// identically as `DecryptFailed`.
pub fn restore_backup(backup: &KeyBackup, password: &str) -> Result<LocalKeySet, RecoveryError> {
    if backup.version != BACKUP_VERSION {
        return Err(RecoveryError::UnsupportedVersion {
            found: backup.version,
        });
    }

    let salt: [u8; SALT_LEN] = encoding::decode_array(&backup.salt)
        .map_err(|e| RecoveryError::InvalidBackup(format!("salt: {e}")))?;
    let nonce_bytes: [u8; NONCE_LEN] = encoding::decode_array(&backup.iv)
        .map_err(|e| RecoveryError::InvalidBackup(format!("iv: {e}")))?;
    let sealed = encoding::decode(&backup.data)
        .map_err(|e| RecoveryError::InvalidBackup(format!("data: {e}")))?;

    let backup_key = derive_backup_key(password, &salt);
    let cipher = Aes256Gcm::new_from_slice(backup_key.as_ref())
        .map_err(|e| RecoveryError::InvalidBackup(e.to_string()))?;
    let plaintext = cipher
        .decrypt(Nonce::from_slice(&nonce_bytes), sealed.as_slice())
        .map_err(|_| RecoveryError::DecryptFailed)?;
    let plaintext = Zeroizing::new(plaintext);

    let bundle: KeyBundle = serde_json::from_slice(&plaintext)
        .map_err(|e| RecoveryError::InvalidBackup(e.to_string()))?;

    import_bundle(&bundle).map_err(|e| RecoveryError::InvalidBackup(e.to_string()))
}

/// Re-import all four keys, checking that each private key re-derives the
/// public key recorded beside it.
fn import_bundle(bundle: &KeyBundle) -> Result<LocalKeySet, CryptoError> {
    let identity_private: Zeroizing<[u8; KEY_LEN]> =
        Zeroizing::new(encoding::decode_array(&bundle.identity_private)?);
    let exchange_private: Zeroizing<[u8; KEY_LEN]> =
        Zeroizing::new(encoding::decode_array(&bundle.exchange_private)?);

    let identity = IdentityKeyPair::from_private_bytes(identity_private.as_ref())?;
    let exchange = ExchangeKeyPair::from_private_bytes(exchange_private.as_ref())?;

    if identity.public().to_base64() != bundle.identity_public {
        return Err(CryptoError::InvalidKey(
            "identity public key does not match its private key".into(),
        ));
    }
    if exchange.public().to_base64() != bundle.exchange_public {
        return Err(CryptoError::InvalidKey(
            "exchange public key does not match its private key".into(),
        ));
    }

    Ok(LocalKeySet { identity, exchange })
}

fn derive_backup_key(password: &str, salt: &[u8]) -> Zeroizing<[u8; 32]> {
    let mut key = Zeroizing::new([0u8; 32]);
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ITERATIONS, key.as_mut());
    key
}
